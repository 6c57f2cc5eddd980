use super::{OutstandingWork, StampRecorder};
use crate::dependences::{DataDependenceType, DependencesVisitor, StorageLocation};
use crate::program::MethodId;
use crate::trace::{Instance, ObjectId};
use rayon::Scope;

/// Visitor standing in for a user visitor during a parallel run
///
/// Events are recorded into a stamp, and every [`Pipeline::flush`] hands the stamp over to the
/// user visitor's [`OutstandingWork`], scheduling a replay on the worker pool if nobody is
/// replaying yet.
pub struct Pipeline<'p, 'scope, 'v> {
    recorder: StampRecorder,
    work: &'scope OutstandingWork<'v>,
    scope: &'p Scope<'scope>,
    flushed: u64,
}

impl<'p, 'scope, 'v> Pipeline<'p, 'scope, 'v> {
    pub fn new(
        work: &'scope OutstandingWork<'v>,
        scope: &'p Scope<'scope>,
    ) -> Pipeline<'p, 'scope, 'v> {
        Pipeline {
            recorder: StampRecorder::new(),
            work,
            scope,
            flushed: 0,
        }
    }

    /// Hand the events recorded so far over to the worker pool
    pub fn flush(&mut self) {
        let stamp = self.recorder.take_stamp();
        if stamp.is_empty() {
            return;
        }
        self.flushed += stamp.len() as u64;
        self.work.add_work(stamp);
        if !self.work.is_executing() {
            let work = self.work;
            self.scope.spawn(move |_| work.run());
        }
    }
}

impl Drop for Pipeline<'_, '_, '_> {
    fn drop(&mut self) {
        log::debug!(
            "Pipeline handed {} events over, {} permits still queued",
            self.flushed,
            self.work.queued_permits()
        );
    }
}

impl DependencesVisitor for Pipeline<'_, '_, '_> {
    fn visit_instruction_execution(&mut self, instance: &Instance, written: &[StorageLocation]) {
        self.recorder.visit_instruction_execution(instance, written)
    }

    fn visit_method_entry(&mut self, method: MethodId, depth: u32) {
        self.recorder.visit_method_entry(method, depth)
    }

    fn visit_method_leave(&mut self, method: MethodId, depth: u32) {
        self.recorder.visit_method_leave(method, depth)
    }

    fn visit_object_creation(&mut self, object: ObjectId, instance: &Instance) {
        self.recorder.visit_object_creation(object, instance)
    }

    fn visit_control_dependence(&mut self, from: &Instance, to: &Instance) {
        self.recorder.visit_control_dependence(from, to)
    }

    fn visit_pending_control_dependence(&mut self, instance: &Instance) {
        self.recorder.visit_pending_control_dependence(instance)
    }

    fn visit_data_dependence(
        &mut self,
        from: &Instance,
        to: &Instance,
        location: &StorageLocation,
        used: &[StorageLocation],
        kind: DataDependenceType,
    ) {
        self.recorder
            .visit_data_dependence(from, to, location, used, kind)
    }

    fn visit_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        self.recorder
            .visit_pending_data_dependence(instance, location, kind)
    }

    fn discard_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        self.recorder
            .discard_pending_data_dependence(instance, location, kind)
    }

    fn visit_end(&mut self, instances: u64) {
        self.recorder.visit_end(instances)
    }

    fn interrupted(&mut self) {
        self.recorder.interrupted()
    }
}
