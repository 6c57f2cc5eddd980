use super::{Capabilities, DataDependenceType, DependencesVisitor, StorageLocation};
use crate::program::{MethodId, Program};
use crate::trace::{Instance, ObjectId};

/// Logs every event it receives, at `info` level
pub struct DependencesPrinter<'p> {
    program: &'p Program,
}

impl<'p> DependencesPrinter<'p> {
    pub const CAPABILITIES: Capabilities = Capabilities::from_bits_truncate(
        Capabilities::DATA_DEPENDENCES_RAW.bits()
            | Capabilities::DATA_DEPENDENCES_WAR.bits()
            | Capabilities::CONTROL_DEPENDENCES.bits()
            | Capabilities::METHOD_ENTRY_LEAVE.bits()
            | Capabilities::OBJECT_CREATION.bits(),
    );

    pub fn new(program: &'p Program) -> DependencesPrinter<'p> {
        DependencesPrinter { program }
    }

    fn describe(&self, instance: &Instance) -> String {
        let method = self.program.method(instance.method);
        format!(
            "{}.{}:{} {}",
            method.full_name(),
            instance.instruction.0,
            instance.occurrence,
            self.program.display(instance.instruction)
        )
    }
}

impl DependencesVisitor for DependencesPrinter<'_> {
    fn visit_method_entry(&mut self, method: MethodId, depth: u32) {
        log::info!(
            "{}entry of {}",
            "  ".repeat(depth as usize),
            self.program.method(method).full_name()
        );
    }

    fn visit_method_leave(&mut self, method: MethodId, depth: u32) {
        log::info!(
            "{}leave of {}",
            "  ".repeat(depth as usize),
            self.program.method(method).full_name()
        );
    }

    fn visit_object_creation(&mut self, object: ObjectId, instance: &Instance) {
        log::info!("object {} created by {}", object.0, self.describe(instance));
    }

    fn visit_control_dependence(&mut self, from: &Instance, to: &Instance) {
        log::info!("control: {} -> {}", self.describe(from), self.describe(to));
    }

    fn visit_data_dependence(
        &mut self,
        from: &Instance,
        to: &Instance,
        location: &StorageLocation,
        _used: &[StorageLocation],
        kind: DataDependenceType,
    ) {
        let kind = match kind {
            DataDependenceType::ReadAfterWrite => "RAW",
            DataDependenceType::WriteAfterRead => "WAR",
        };
        log::info!(
            "{} on {}: {} -> {}",
            kind,
            location,
            self.describe(from),
            self.describe(to)
        );
    }

    fn visit_end(&mut self, instances: u64) {
        log::info!("end after {} instances", instances);
    }

    fn interrupted(&mut self) {
        log::info!("interrupted");
    }
}
