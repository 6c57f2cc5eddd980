use super::StorageLocation;
use crate::program::MethodId;
use crate::trace::{Instance, ObjectId};
use bitflags::bitflags;

bitflags! {
    /// Callbacks a visitor wants to receive
    ///
    /// The extractor only does the bookkeeping needed for the requested capabilities, so asking
    /// for less makes extraction faster.
    pub struct Capabilities: u16 {
        const DATA_DEPENDENCES_RAW = 0x0001;
        const DATA_DEPENDENCES_WAR = 0x0002;
        const CONTROL_DEPENDENCES = 0x0004;
        const PENDING_DATA_DEPENDENCES_RAW = 0x0008;
        const PENDING_DATA_DEPENDENCES_WAR = 0x0010;
        const PENDING_CONTROL_DEPENDENCES = 0x0020;
        const INSTRUCTION_EXECUTIONS = 0x0040;
        const METHOD_ENTRY_LEAVE = 0x0080;
        const OBJECT_CREATION = 0x0100;
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DataDependenceType {
    /// The value read by one instance was written by an earlier instance
    ReadAfterWrite,

    /// The location written by one instance was read by an earlier instance
    WriteAfterRead,
}

/// Receives the events produced by a backward traversal
///
/// Events arrive in backward order. In every dependence, `from` is the instance that was seen
/// first (so it executed later) and `to` is the instance it depends on.
///
/// Only the callbacks matching the [`Capabilities`] requested at registration are ever called.
pub trait DependencesVisitor {
    /// An instance was processed, writing the given locations
    fn visit_instruction_execution(&mut self, _instance: &Instance, _written: &[StorageLocation]) {}

    /// The frame at `depth` was entered (seen last, since the traversal is backward)
    fn visit_method_entry(&mut self, _method: MethodId, _depth: u32) {}

    /// A frame for `method` appeared at `depth`
    fn visit_method_leave(&mut self, _method: MethodId, _depth: u32) {}

    /// No location of `object` can be older than `instance`
    fn visit_object_creation(&mut self, _object: ObjectId, _instance: &Instance) {}

    /// Whether `from` executed was decided by `to`
    fn visit_control_dependence(&mut self, _from: &Instance, _to: &Instance) {}

    /// `instance` may still get control dependences
    fn visit_pending_control_dependence(&mut self, _instance: &Instance) {}

    /// `from` depends on `to` through `location`
    ///
    /// For read-after-write dependences, `used` holds the locations whose values flowed into
    /// `location` when `to` wrote it.
    fn visit_data_dependence(
        &mut self,
        _from: &Instance,
        _to: &Instance,
        _location: &StorageLocation,
        _used: &[StorageLocation],
        _kind: DataDependenceType,
    ) {
    }

    /// `instance` may still get data dependences through `location`
    fn visit_pending_data_dependence(
        &mut self,
        _instance: &Instance,
        _location: &StorageLocation,
        _kind: DataDependenceType,
    ) {
    }

    /// `instance` will not get any more data dependences through `location`
    fn discard_pending_data_dependence(
        &mut self,
        _instance: &Instance,
        _location: &StorageLocation,
        _kind: DataDependenceType,
    ) {
    }

    /// The traversal is over after `instances` instances
    fn visit_end(&mut self, _instances: u64) {}

    /// The traversal was cancelled (no further events follow)
    fn interrupted(&mut self) {}
}

impl<V: DependencesVisitor + ?Sized> DependencesVisitor for &mut V {
    fn visit_instruction_execution(&mut self, instance: &Instance, written: &[StorageLocation]) {
        (**self).visit_instruction_execution(instance, written)
    }

    fn visit_method_entry(&mut self, method: MethodId, depth: u32) {
        (**self).visit_method_entry(method, depth)
    }

    fn visit_method_leave(&mut self, method: MethodId, depth: u32) {
        (**self).visit_method_leave(method, depth)
    }

    fn visit_object_creation(&mut self, object: ObjectId, instance: &Instance) {
        (**self).visit_object_creation(object, instance)
    }

    fn visit_control_dependence(&mut self, from: &Instance, to: &Instance) {
        (**self).visit_control_dependence(from, to)
    }

    fn visit_pending_control_dependence(&mut self, instance: &Instance) {
        (**self).visit_pending_control_dependence(instance)
    }

    fn visit_data_dependence(
        &mut self,
        from: &Instance,
        to: &Instance,
        location: &StorageLocation,
        used: &[StorageLocation],
        kind: DataDependenceType,
    ) {
        (**self).visit_data_dependence(from, to, location, used, kind)
    }

    fn visit_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        (**self).visit_pending_data_dependence(instance, location, kind)
    }

    fn discard_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        (**self).discard_pending_data_dependence(instance, location, kind)
    }

    fn visit_end(&mut self, instances: u64) {
        (**self).visit_end(instances)
    }

    fn interrupted(&mut self) {
        (**self).interrupted()
    }
}
