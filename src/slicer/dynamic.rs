use super::{CriterionInstance, Error, Match, SlicingCriterion};
use crate::dependences::{
    Capabilities, DataDependenceType, DependencesExtractor, DependencesVisitor, StorageLocation,
};
use crate::program::{InstrId, MethodId, Opcode, Program};
use crate::trace::{Instance, ThreadTrace};
use crate::Settings;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Receives slice membership as it is discovered
pub trait SliceVisitor {
    /// `instance` matched a criterion
    fn visit_match(&mut self, _instance: &Instance) {}

    /// `to` is in the slice because `from` depends on it
    fn visit_slice_dependence(&mut self, _from: &Instance, _to: &Instance, _distance: u32) {}

    fn end(&mut self) {}
}

/// Which data read by a slice resident instance is of interest
#[derive(Clone, Debug, Eq, PartialEq)]
enum DataInterest {
    All,
    Only(Vec<StorageLocation>),
}

impl DataInterest {
    fn covers(&self, location: &StorageLocation) -> bool {
        match self {
            DataInterest::All => true,
            DataInterest::Only(locations) => locations.contains(location),
        }
    }

    fn merge(&mut self, other: DataInterest) {
        match (&mut *self, other) {
            (DataInterest::All, _) => (),
            (_, DataInterest::All) => *self = DataInterest::All,
            (DataInterest::Only(locations), DataInterest::Only(more)) => {
                for location in more {
                    if !locations.contains(&location) {
                        locations.push(location);
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
struct Resident {
    instance: Instance,
    distance: u32,
    interest: DataInterest,

    /// Reads of this instance whose writer has not been found yet
    open_reads: u32,

    /// Every instance gets exactly one control dependence, and this one has not had it yet
    awaiting_control: bool,
}

impl Resident {
    /// No further dependence can start at this instance
    fn is_settled(&self) -> bool {
        self.open_reads == 0 && !self.awaiting_control
    }
}

/// Dynamic slice: the static instructions that influenced the criteria
#[derive(Clone, Debug, Default)]
pub struct Slice {
    /// Instructions in the instruction total order, with their smallest distance
    entries: Vec<(InstrId, u32)>,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn instructions(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.entries.iter().map(|(instruction, _)| *instruction)
    }

    pub fn entries(&self) -> &[(InstrId, u32)] {
        &self.entries
    }

    pub fn contains(&self, instruction: InstrId) -> bool {
        self.entries.iter().any(|(instr, _)| *instr == instruction)
    }

    /// Smallest number of dependence edges between a criterion and the instruction
    pub fn distance(&self, instruction: InstrId) -> Option<u32> {
        self.entries
            .iter()
            .find(|(instr, _)| *instr == instruction)
            .map(|(_, distance)| *distance)
    }

    pub fn display<'a>(&'a self, program: &'a Program, show_distances: bool) -> SliceDisplay<'a> {
        SliceDisplay {
            slice: self,
            program,
            show_distances,
        }
    }
}

pub struct SliceDisplay<'a> {
    slice: &'a Slice,
    program: &'a Program,
    show_distances: bool,
}

impl fmt::Display for SliceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (instruction, distance) in &self.slice.entries {
            let method = self.program.method(self.program.instruction(*instruction).method);
            write!(
                f,
                "{}:{}",
                method.full_name(),
                self.program.display(*instruction)
            )?;
            if self.show_distances {
                write!(f, "   [{}]", distance)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Visitor computing a dynamic slice while the extractor walks the trace backwards
///
/// Instances matched by a criterion start out slice resident, at distance 0. From then on, a
/// control dependence from a resident instance makes its target resident, and so does a data
/// dependence through a location the resident instance is interested in.
///
/// Labels merge control paths, so they are never reported themselves: edges to a label are
/// remembered, and edges out of the label are reported from the instances that reached it.
///
/// A resident instance is forgotten again once its control dependence was seen and all of its
/// pending reads were resolved or discarded. Only the static slice grows with the trace.
pub struct DynamicSlicer<'p> {
    program: &'p Program,
    criteria: Vec<CriterionInstance>,

    /// Resident instances, by counter
    residents: HashMap<u64, Resident>,

    /// Instances that reached each resident label
    label_predecessors: HashMap<u64, Vec<Instance>>,

    /// Largest number of instances resident at the same time
    peak_residents: usize,

    /// Local slots named by a criterion, waiting for their writer, per stack depth
    interesting_locals: HashMap<u32, HashSet<u16>>,

    static_slice: HashMap<InstrId, u32>,
    consumers: Vec<Box<dyn SliceVisitor + Send + 'p>>,
}

impl<'p> DynamicSlicer<'p> {
    pub const CAPABILITIES: Capabilities = Capabilities::from_bits_truncate(
        Capabilities::CONTROL_DEPENDENCES.bits()
            | Capabilities::DATA_DEPENDENCES_RAW.bits()
            | Capabilities::PENDING_DATA_DEPENDENCES_RAW.bits()
            | Capabilities::INSTRUCTION_EXECUTIONS.bits()
            | Capabilities::METHOD_ENTRY_LEAVE.bits(),
    );

    pub fn new(program: &'p Program, criteria: Vec<CriterionInstance>) -> DynamicSlicer<'p> {
        DynamicSlicer {
            program,
            criteria,
            residents: HashMap::new(),
            label_predecessors: HashMap::new(),
            peak_residents: 0,
            interesting_locals: HashMap::new(),
            static_slice: HashMap::new(),
            consumers: vec![],
        }
    }

    pub fn add_consumer(&mut self, consumer: Box<dyn SliceVisitor + Send + 'p>) {
        self.consumers.push(consumer);
    }

    /// The slice so far, without labels and unconditional jumps
    pub fn finish(&self) -> Slice {
        let mut entries: Vec<(InstrId, u32)> = self
            .static_slice
            .iter()
            .filter(|(instruction, _)| {
                let opcode = &self.program.instruction(**instruction).opcode;
                !opcode.is_label() && !opcode.is_unconditional_jump()
            })
            .map(|(instruction, distance)| (*instruction, *distance))
            .collect();
        entries.sort_by(|(a, _), (b, _)| self.program.instruction_order(*a, *b));
        Slice { entries }
    }

    /// Number of instances currently resident
    pub fn resident_instances(&self) -> usize {
        self.residents.len()
    }

    /// Largest number of instances that were resident at the same time
    pub fn peak_resident_instances(&self) -> usize {
        self.peak_residents
    }

    fn is_label(&self, instance: &Instance) -> bool {
        self.program
            .instruction(instance.instruction)
            .opcode
            .is_label()
    }

    fn make_resident(&mut self, instance: &Instance, distance: u32, interest: DataInterest) {
        match self.residents.get_mut(&instance.counter) {
            Some(resident) => {
                resident.distance = resident.distance.min(distance);
                resident.interest.merge(interest);
            }
            None => {
                self.residents.insert(
                    instance.counter,
                    Resident {
                        instance: *instance,
                        distance,
                        interest,
                        open_reads: 0,
                        awaiting_control: true,
                    },
                );
                self.peak_residents = self.peak_residents.max(self.residents.len());
            }
        }
        let known = self
            .static_slice
            .entry(instance.instruction)
            .or_insert(distance);
        *known = (*known).min(distance);
    }

    fn report_match(&mut self, instance: &Instance) {
        self.make_resident(instance, 0, DataInterest::All);
        for consumer in &mut self.consumers {
            consumer.visit_match(instance);
        }
    }

    /// Follow a dependence out of a resident instance
    fn follow(&mut self, from: &Instance, to: &Instance, interest: DataInterest) {
        let distance = match self.residents.get(&from.counter) {
            Some(resident) => resident.distance,
            None => return,
        };
        let sources = if self.is_label(from) {
            match self.label_predecessors.get(&from.counter) {
                Some(predecessors) if !predecessors.is_empty() => predecessors.clone(),
                _ => vec![*from],
            }
        } else {
            vec![*from]
        };

        if self.is_label(to) {
            self.make_resident(to, distance, interest);
            let predecessors = self.label_predecessors.entry(to.counter).or_default();
            for source in sources {
                if !predecessors.contains(&source) {
                    predecessors.push(source);
                }
            }
            return;
        }

        let distance = distance + 1;
        self.make_resident(to, distance, interest);
        for source in &sources {
            for consumer in &mut self.consumers {
                consumer.visit_slice_dependence(source, to, distance);
            }
        }
    }

    /// Forget a resident instance once nothing can depend on it anymore
    fn release_if_settled(&mut self, counter: u64) {
        if self.residents.get(&counter).map_or(false, Resident::is_settled) {
            self.residents.remove(&counter);
            self.label_predecessors.remove(&counter);
        }
    }

    fn reset_depth(&mut self, depth: u32) {
        for criterion in &mut self.criteria {
            criterion.reset_depth(depth);
        }
        self.interesting_locals.remove(&depth);
    }
}

impl DependencesVisitor for DynamicSlicer<'_> {
    fn visit_instruction_execution(&mut self, instance: &Instance, written: &[StorageLocation]) {
        let program = self.program;
        let mut matched = false;
        for criterion in &mut self.criteria {
            let outcome = criterion.matches(program, instance);
            if !outcome.is_match() {
                continue;
            }
            if criterion.criterion().variables.is_empty() {
                matched = true;
            } else if outcome == Match::RunStart {
                let slots = criterion.variable_slots(program, instance);
                self.interesting_locals
                    .entry(instance.stack_depth)
                    .or_default()
                    .extend(slots);
            }
        }
        if matched {
            self.report_match(instance);
        }

        let writes_interesting = match self.interesting_locals.get_mut(&instance.stack_depth) {
            Some(slots) if !slots.is_empty() => {
                let mut hit = false;
                for location in written {
                    if let StorageLocation::Local { slot, .. } = location {
                        hit |= slots.remove(slot);
                    }
                }
                hit
            }
            _ => false,
        };
        if writes_interesting {
            self.report_match(instance);
        }
    }

    fn visit_method_entry(&mut self, _method: MethodId, depth: u32) {
        self.reset_depth(depth);
    }

    fn visit_method_leave(&mut self, _method: MethodId, depth: u32) {
        self.reset_depth(depth);
    }

    fn visit_control_dependence(&mut self, from: &Instance, to: &Instance) {
        let interest = match self.program.instruction(to.instruction).opcode {
            // The call itself matters, not the arguments it was given
            Opcode::Invoke(_, _) => DataInterest::Only(vec![]),
            _ => DataInterest::All,
        };
        self.follow(from, to, interest);
        if let Some(resident) = self.residents.get_mut(&from.counter) {
            resident.awaiting_control = false;
            self.release_if_settled(from.counter);
        }
    }

    fn visit_data_dependence(
        &mut self,
        from: &Instance,
        to: &Instance,
        location: &StorageLocation,
        used: &[StorageLocation],
        kind: DataDependenceType,
    ) {
        if kind != DataDependenceType::ReadAfterWrite {
            return;
        }
        let covered = self
            .residents
            .get(&from.counter)
            .map_or(false, |resident| resident.interest.covers(location));
        if covered {
            self.follow(from, to, DataInterest::Only(used.to_vec()));
        }
    }

    fn visit_pending_data_dependence(
        &mut self,
        instance: &Instance,
        _location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        if kind != DataDependenceType::ReadAfterWrite {
            return;
        }
        if let Some(resident) = self.residents.get_mut(&instance.counter) {
            resident.open_reads += 1;
        }
    }

    fn discard_pending_data_dependence(
        &mut self,
        instance: &Instance,
        _location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        if kind != DataDependenceType::ReadAfterWrite {
            return;
        }
        if let Some(resident) = self.residents.get_mut(&instance.counter) {
            resident.open_reads = resident.open_reads.saturating_sub(1);
            self.release_if_settled(instance.counter);
        }
    }

    fn visit_end(&mut self, instances: u64) {
        log::info!(
            "Slice of {} instructions (at most {} resident instances out of {})",
            self.finish().len(),
            self.peak_residents,
            instances
        );
        for consumer in &mut self.consumers {
            consumer.end();
        }
    }

    fn interrupted(&mut self) {
        log::info!("Slicing interrupted with {} resident instances", self.residents.len());
    }
}

/// Slice one thread of a trace
pub fn compute_slice(
    program: &Program,
    thread: &ThreadTrace,
    criteria: &[SlicingCriterion],
    settings: &Settings,
) -> Result<Slice, Error> {
    let criteria = criteria
        .iter()
        .map(|criterion| criterion.instantiate(program))
        .collect::<Result<Vec<_>, _>>()?;
    let mut slicer = DynamicSlicer::new(program, criteria);
    {
        let mut extractor = DependencesExtractor::new(program);
        extractor.register(&mut slicer, DynamicSlicer::CAPABILITIES);
        extractor.process(thread.backward_iterator(program), settings)?;
    }
    Ok(slicer.finish())
}
