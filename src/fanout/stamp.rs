use crate::dependences::{DataDependenceType, DependencesVisitor, StorageLocation};
use crate::program::MethodId;
use crate::trace::{Instance, ObjectId};

/// Tag of one event in a stamp
///
/// Each kind consumes a fixed shape of payload from the stamp's arrays (noted per variant).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum EventKind {
    /// 1 instance, 1 long (count), that many locations
    InstructionExecution,
    /// 1 method, 1 long (depth)
    MethodEntry,
    /// 1 method, 1 long (depth)
    MethodLeave,
    /// 1 long (object), 1 instance
    ObjectCreation,
    /// 2 instances
    ControlDependence,
    /// 1 instance
    PendingControlDependence,
    /// 2 instances, 1 location, 1 long (count), that many locations
    DataDependenceRaw,
    /// 2 instances, 1 location, 1 long (count), that many locations
    DataDependenceWar,
    /// 1 instance, 1 location
    PendingDataDependenceRaw,
    /// 1 instance, 1 location
    PendingDataDependenceWar,
    /// 1 instance, 1 location
    DiscardPendingRaw,
    /// 1 instance, 1 location
    DiscardPendingWar,
    /// 1 long (instances)
    End,
    Interrupted,
}

/// Immutable batch of events, replayable against any visitor
///
/// Payload arrays stay unallocated when no event of the batch needs them.
#[derive(Debug, Default)]
pub struct EventStamp {
    kinds: Vec<EventKind>,
    instances: Option<Vec<Instance>>,
    methods: Option<Vec<MethodId>>,
    longs: Option<Vec<i64>>,
    locations: Option<Vec<StorageLocation>>,
}

/// Read cursors into a stamp's payload arrays
#[derive(Default)]
struct Cursors {
    instances: usize,
    methods: usize,
    longs: usize,
    locations: usize,
}

impl EventStamp {
    /// Number of events
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    fn instance(&self, cursors: &mut Cursors) -> &Instance {
        let instances = self.instances.as_deref().unwrap_or(&[]);
        cursors.instances += 1;
        &instances[cursors.instances - 1]
    }

    fn method(&self, cursors: &mut Cursors) -> MethodId {
        let methods = self.methods.as_deref().unwrap_or(&[]);
        cursors.methods += 1;
        methods[cursors.methods - 1]
    }

    fn long(&self, cursors: &mut Cursors) -> i64 {
        let longs = self.longs.as_deref().unwrap_or(&[]);
        cursors.longs += 1;
        longs[cursors.longs - 1]
    }

    fn locations(&self, cursors: &mut Cursors, count: usize) -> &[StorageLocation] {
        let locations = self.locations.as_deref().unwrap_or(&[]);
        cursors.locations += count;
        &locations[cursors.locations - count..cursors.locations]
    }

    /// Feed every event, in order, to a visitor
    pub fn replay(&self, visitor: &mut dyn DependencesVisitor) {
        use DataDependenceType::*;

        let mut cursors = Cursors::default();
        for kind in &self.kinds {
            match kind {
                EventKind::InstructionExecution => {
                    let instance = self.instance(&mut cursors);
                    let count = self.long(&mut cursors) as usize;
                    let written = self.locations(&mut cursors, count);
                    visitor.visit_instruction_execution(instance, written);
                }
                EventKind::MethodEntry => {
                    let method = self.method(&mut cursors);
                    let depth = self.long(&mut cursors) as u32;
                    visitor.visit_method_entry(method, depth);
                }
                EventKind::MethodLeave => {
                    let method = self.method(&mut cursors);
                    let depth = self.long(&mut cursors) as u32;
                    visitor.visit_method_leave(method, depth);
                }
                EventKind::ObjectCreation => {
                    let object = ObjectId(self.long(&mut cursors));
                    let instance = self.instance(&mut cursors);
                    visitor.visit_object_creation(object, instance);
                }
                EventKind::ControlDependence => {
                    let from = self.instance(&mut cursors);
                    let to = self.instance(&mut cursors);
                    visitor.visit_control_dependence(from, to);
                }
                EventKind::PendingControlDependence => {
                    let instance = self.instance(&mut cursors);
                    visitor.visit_pending_control_dependence(instance);
                }
                EventKind::DataDependenceRaw | EventKind::DataDependenceWar => {
                    let from = self.instance(&mut cursors);
                    let to = self.instance(&mut cursors);
                    let location = self.locations(&mut cursors, 1)[0];
                    let count = self.long(&mut cursors) as usize;
                    let used = self.locations(&mut cursors, count);
                    let kind = if *kind == EventKind::DataDependenceRaw {
                        ReadAfterWrite
                    } else {
                        WriteAfterRead
                    };
                    visitor.visit_data_dependence(from, to, &location, used, kind);
                }
                EventKind::PendingDataDependenceRaw | EventKind::PendingDataDependenceWar => {
                    let instance = self.instance(&mut cursors);
                    let location = self.locations(&mut cursors, 1)[0];
                    let kind = if *kind == EventKind::PendingDataDependenceRaw {
                        ReadAfterWrite
                    } else {
                        WriteAfterRead
                    };
                    visitor.visit_pending_data_dependence(instance, &location, kind);
                }
                EventKind::DiscardPendingRaw | EventKind::DiscardPendingWar => {
                    let instance = self.instance(&mut cursors);
                    let location = self.locations(&mut cursors, 1)[0];
                    let kind = if *kind == EventKind::DiscardPendingRaw {
                        ReadAfterWrite
                    } else {
                        WriteAfterRead
                    };
                    visitor.discard_pending_data_dependence(instance, &location, kind);
                }
                EventKind::End => {
                    let instances = self.long(&mut cursors) as u64;
                    visitor.visit_end(instances);
                }
                EventKind::Interrupted => visitor.interrupted(),
            }
        }
    }
}

/// Visitor that records the events it receives into stamps
#[derive(Debug, Default)]
pub struct StampRecorder {
    stamp: EventStamp,
}

impl StampRecorder {
    pub fn new() -> StampRecorder {
        StampRecorder::default()
    }

    /// Number of events recorded since the last stamp was taken
    pub fn pending_events(&self) -> usize {
        self.stamp.len()
    }

    /// Take the events recorded so far
    pub fn take_stamp(&mut self) -> EventStamp {
        std::mem::take(&mut self.stamp)
    }

    fn push_instance(&mut self, instance: &Instance) {
        self.stamp
            .instances
            .get_or_insert_with(Vec::new)
            .push(*instance);
    }

    fn push_long(&mut self, long: i64) {
        self.stamp.longs.get_or_insert_with(Vec::new).push(long);
    }

    fn push_method(&mut self, method: MethodId) {
        self.stamp.methods.get_or_insert_with(Vec::new).push(method);
    }

    fn push_locations(&mut self, locations: &[StorageLocation]) {
        if !locations.is_empty() {
            self.stamp
                .locations
                .get_or_insert_with(Vec::new)
                .extend_from_slice(locations);
        }
    }
}

impl DependencesVisitor for StampRecorder {
    fn visit_instruction_execution(&mut self, instance: &Instance, written: &[StorageLocation]) {
        self.stamp.kinds.push(EventKind::InstructionExecution);
        self.push_instance(instance);
        self.push_long(written.len() as i64);
        self.push_locations(written);
    }

    fn visit_method_entry(&mut self, method: MethodId, depth: u32) {
        self.stamp.kinds.push(EventKind::MethodEntry);
        self.push_method(method);
        self.push_long(depth as i64);
    }

    fn visit_method_leave(&mut self, method: MethodId, depth: u32) {
        self.stamp.kinds.push(EventKind::MethodLeave);
        self.push_method(method);
        self.push_long(depth as i64);
    }

    fn visit_object_creation(&mut self, object: ObjectId, instance: &Instance) {
        self.stamp.kinds.push(EventKind::ObjectCreation);
        self.push_long(object.0);
        self.push_instance(instance);
    }

    fn visit_control_dependence(&mut self, from: &Instance, to: &Instance) {
        self.stamp.kinds.push(EventKind::ControlDependence);
        self.push_instance(from);
        self.push_instance(to);
    }

    fn visit_pending_control_dependence(&mut self, instance: &Instance) {
        self.stamp.kinds.push(EventKind::PendingControlDependence);
        self.push_instance(instance);
    }

    fn visit_data_dependence(
        &mut self,
        from: &Instance,
        to: &Instance,
        location: &StorageLocation,
        used: &[StorageLocation],
        kind: DataDependenceType,
    ) {
        self.stamp.kinds.push(match kind {
            DataDependenceType::ReadAfterWrite => EventKind::DataDependenceRaw,
            DataDependenceType::WriteAfterRead => EventKind::DataDependenceWar,
        });
        self.push_instance(from);
        self.push_instance(to);
        self.push_locations(std::slice::from_ref(location));
        self.push_long(used.len() as i64);
        self.push_locations(used);
    }

    fn visit_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        self.stamp.kinds.push(match kind {
            DataDependenceType::ReadAfterWrite => EventKind::PendingDataDependenceRaw,
            DataDependenceType::WriteAfterRead => EventKind::PendingDataDependenceWar,
        });
        self.push_instance(instance);
        self.push_locations(std::slice::from_ref(location));
    }

    fn discard_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        self.stamp.kinds.push(match kind {
            DataDependenceType::ReadAfterWrite => EventKind::DiscardPendingRaw,
            DataDependenceType::WriteAfterRead => EventKind::DiscardPendingWar,
        });
        self.push_instance(instance);
        self.push_locations(std::slice::from_ref(location));
    }

    fn visit_end(&mut self, instances: u64) {
        self.stamp.kinds.push(EventKind::End);
        self.push_long(instances as i64);
    }

    fn interrupted(&mut self) {
        self.stamp.kinds.push(EventKind::Interrupted);
    }
}
