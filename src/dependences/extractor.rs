use super::{
    Capabilities, DataDependenceType, DependencesVisitor, DrainedFrame, Error, Evicted,
    FrameStack, FrameTransition, LocationIndex, Simulator, StackSimulator,
};
use crate::fanout::{OutstandingWork, Pipeline};
use crate::program::control_flow::inverse_control_dependences;
use crate::program::{InstrId, MethodId, Program};
use crate::trace::{BackwardInstanceIterator, Instance, PipelinedIterator};
use crate::Settings;
use std::collections::{HashMap, HashSet};

/// Identifies a visitor registered with a [`DependencesExtractor`]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct VisitorHandle(u32);

struct Registration<'a> {
    handle: VisitorHandle,
    visitor: &'a mut (dyn DependencesVisitor + Send + 'a),
    capabilities: Capabilities,
}

/// Lazily computed inverse control dependences, for every method seen so far
#[derive(Default)]
struct ControlDependences {
    computed: HashSet<MethodId>,
    dependents: HashMap<InstrId, Vec<InstrId>>,
}

impl ControlDependences {
    /// Instructions control dependent on the instruction of `instance`
    fn dependents(&mut self, program: &Program, instance: &Instance) -> &[InstrId] {
        if self.computed.insert(instance.method) {
            let table = inverse_control_dependences(program, instance.method);
            log::debug!(
                "Computed control dependences of {} ({} branches)",
                program.method(instance.method).full_name(),
                table.len()
            );
            self.dependents.extend(table);
        }
        self.dependents
            .get(&instance.instruction)
            .map(|dependents| dependents.as_slice())
            .unwrap_or(&[])
    }
}

/// Replays a backward trace once, reporting dependences to the registered visitors
///
/// ```ignore
/// let mut extractor = DependencesExtractor::new(&program);
/// extractor.register(&mut slicer, DynamicSlicer::CAPABILITIES);
/// extractor.process(thread.backward_iterator(&program), &settings)?;
/// ```
pub struct DependencesExtractor<'a, S: Simulator = StackSimulator> {
    program: &'a Program,
    simulator: S,
    registrations: Vec<Registration<'a>>,
    next_handle: u32,
    control: ControlDependences,
}

impl<'a> DependencesExtractor<'a> {
    pub fn new(program: &'a Program) -> DependencesExtractor<'a> {
        DependencesExtractor::with_simulator(program, StackSimulator::new())
    }
}

impl<'a, S: Simulator> DependencesExtractor<'a, S> {
    pub fn with_simulator(program: &'a Program, simulator: S) -> DependencesExtractor<'a, S> {
        DependencesExtractor {
            program,
            simulator,
            registrations: vec![],
            next_handle: 0,
            control: ControlDependences::default(),
        }
    }

    /// Register a visitor for the callbacks in `capabilities`
    pub fn register(
        &mut self,
        visitor: &'a mut (dyn DependencesVisitor + Send + 'a),
        capabilities: Capabilities,
    ) -> VisitorHandle {
        let handle = VisitorHandle(self.next_handle);
        self.next_handle += 1;
        self.registrations.push(Registration {
            handle,
            visitor,
            capabilities,
        });
        handle
    }

    /// Stop reporting to a visitor, handing it back
    pub fn unregister(
        &mut self,
        handle: VisitorHandle,
    ) -> Option<&'a mut (dyn DependencesVisitor + Send + 'a)> {
        let idx = self
            .registrations
            .iter()
            .position(|registration| registration.handle == handle)?;
        Some(self.registrations.remove(idx).visitor)
    }

    /// Union of the capabilities of all registered visitors
    pub fn capabilities(&self) -> Capabilities {
        self.registrations
            .iter()
            .fold(Capabilities::empty(), |caps, registration| {
                caps | registration.capabilities
            })
    }

    /// Run the backward traversal to completion
    ///
    /// Returns the number of instances processed. Every visitor has received `visit_end` when
    /// this returns successfully. On cancellation, visitors receive `interrupted` instead and
    /// this returns [`Error::Interrupted`].
    pub fn process<I>(&mut self, iter: I, settings: &Settings) -> Result<u64, Error>
    where
        I: BackwardInstanceIterator + Send,
    {
        if settings.pipelined {
            std::thread::scope(|scope| {
                let iter = PipelinedIterator::spawn(scope, iter, settings);
                self.process_instances(iter, settings)
            })
        } else {
            self.process_instances(iter, settings)
        }
    }

    fn process_instances<I>(&mut self, iter: I, settings: &Settings) -> Result<u64, Error>
    where
        I: BackwardInstanceIterator,
    {
        let program = self.program;
        let DependencesExtractor {
            simulator,
            registrations,
            control,
            ..
        } = self;
        let frames = FrameStack::new(iter.initial_stack_methods());

        if !settings.parallel {
            let mut sinks: Vec<Sink<_>> = registrations
                .iter_mut()
                .map(|registration| Sink {
                    visitor: &mut *registration.visitor,
                    capabilities: registration.capabilities,
                })
                .collect();
            let extraction = Extraction::new(program, simulator, control, frames, &mut sinks);
            return extraction.run(iter, settings, |_| ());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads.max(1))
            .thread_name(|idx| format!("dynslice-fanout-{}", idx))
            .build()
            .map_err(|err| Error::WorkerPool(err.to_string()))?;
        let works: Vec<(OutstandingWork, Capabilities)> = registrations
            .iter_mut()
            .map(|registration| {
                let visitor: &mut (dyn DependencesVisitor + Send) = &mut *registration.visitor;
                (
                    OutstandingWork::new(visitor, settings.max_buffered_events),
                    registration.capabilities,
                )
            })
            .collect();
        log::debug!(
            "Fanning events out to {} pipelines on {} threads",
            works.len(),
            pool.current_num_threads()
        );

        let result = pool.in_place_scope(|scope| {
            let mut sinks: Vec<Sink<Pipeline>> = works
                .iter()
                .map(|(work, capabilities)| Sink {
                    visitor: Pipeline::new(work, scope),
                    capabilities: *capabilities,
                })
                .collect();
            let extraction = Extraction::new(program, simulator, control, frames, &mut sinks);
            let result = extraction.run(iter, settings, |sinks| {
                for sink in sinks {
                    sink.visitor.flush();
                }
            });
            for sink in &mut sinks {
                sink.visitor.flush();
            }
            result
        });
        for (work, _) in &works {
            work.finish();
        }
        result
    }
}

/// A visitor, and what it asked for
struct Sink<V> {
    visitor: V,
    capabilities: Capabilities,
}

fn emit<V: DependencesVisitor>(
    sinks: &mut [Sink<V>],
    wanted: Capabilities,
    mut event: impl FnMut(&mut V),
) {
    for sink in sinks.iter_mut() {
        if sink.capabilities.intersects(wanted) {
            event(&mut sink.visitor);
        }
    }
}

/// State of one traversal
struct Extraction<'e, S, V> {
    program: &'e Program,
    simulator: &'e mut S,
    control: &'e mut ControlDependences,
    sinks: &'e mut [Sink<V>],
    capabilities: Capabilities,
    frames: FrameStack,
    index: LocationIndex,
    transitions: Vec<FrameTransition>,
    drained: Vec<DrainedFrame>,
}

impl<'e, S: Simulator, V: DependencesVisitor> Extraction<'e, S, V> {
    fn new(
        program: &'e Program,
        simulator: &'e mut S,
        control: &'e mut ControlDependences,
        frames: FrameStack,
        sinks: &'e mut [Sink<V>],
    ) -> Extraction<'e, S, V> {
        let capabilities = sinks
            .iter()
            .fold(Capabilities::empty(), |caps, sink| caps | sink.capabilities);
        Extraction {
            program,
            simulator,
            control,
            sinks,
            capabilities,
            frames,
            index: LocationIndex::new(),
            transitions: vec![],
            drained: vec![],
        }
    }

    /// Process every instance, calling `on_batch` every `stamp_instances` instances
    fn run<I: BackwardInstanceIterator>(
        mut self,
        mut iter: I,
        settings: &Settings,
        mut on_batch: impl FnMut(&mut [Sink<V>]),
    ) -> Result<u64, Error> {
        let check_interval = settings.cancellation_check_interval.max(1);
        let batch = settings.stamp_instances.max(1) as u64;
        log::info!(
            "Starting backward traversal for {} visitors ({:?})",
            self.sinks.len(),
            self.capabilities
        );

        let mut processed: u64 = 0;
        loop {
            if processed % check_interval == 0 {
                if settings.cancellation.is_cancelled() {
                    return self.interrupt(processed, &mut on_batch);
                }
                log::trace!(
                    "{} instances processed ({:.1}%)",
                    processed,
                    iter.percentage_done()
                );
            }

            let instance = match iter.next() {
                Some(instance) => instance?,
                // A cancelled background reader ends its stream early
                None if settings.cancellation.is_cancelled() => {
                    return self.interrupt(processed, &mut on_batch);
                }
                None => break,
            };
            self.process_instance(&instance)?;
            processed += 1;

            if processed % batch == 0 {
                on_batch(&mut *self.sinks);
            }
        }

        let evicted = self.index.evict_all();
        self.discard(evicted);
        for sink in self.sinks.iter_mut() {
            sink.visitor.visit_end(processed);
        }
        log::info!("Backward traversal done after {} instances", processed);
        Ok(processed)
    }

    /// Tell every visitor the run was cancelled
    fn interrupt(
        &mut self,
        processed: u64,
        on_batch: &mut impl FnMut(&mut [Sink<V>]),
    ) -> Result<u64, Error> {
        log::info!("Traversal cancelled after {} instances", processed);
        for sink in self.sinks.iter_mut() {
            sink.visitor.interrupted();
        }
        on_batch(&mut *self.sinks);
        Err(Error::Interrupted)
    }

    fn process_instance(&mut self, instance: &Instance) -> Result<(), Error> {
        let program = self.program;
        let opcode = &program.instruction(instance.instruction).opcode;
        let track_control = self
            .capabilities
            .intersects(Capabilities::CONTROL_DEPENDENCES | Capabilities::PENDING_CONTROL_DEPENDENCES);

        // Method boundaries
        self.frames
            .enter(instance, program, &mut self.transitions, &mut self.drained);
        for transition in self.transitions.drain(..) {
            match transition {
                FrameTransition::MethodEntry { method, depth } => {
                    emit(self.sinks, Capabilities::METHOD_ENTRY_LEAVE, |v| {
                        v.visit_method_entry(method, depth)
                    })
                }
                FrameTransition::MethodLeave { method, depth } => {
                    emit(self.sinks, Capabilities::METHOD_ENTRY_LEAVE, |v| {
                        v.visit_method_leave(method, depth)
                    })
                }
            }
        }
        let mut drained = std::mem::take(&mut self.drained);
        for DrainedFrame { mut frame, replaced } in drained.drain(..) {
            let evicted = self.index.evict_frame(frame.id);
            self.discard(evicted);
            if track_control && !replaced {
                // Whatever was not decided inside the callee was decided by the call
                for dependent in frame.take_interesting() {
                    emit(self.sinks, Capabilities::CONTROL_DEPENDENCES, |v| {
                        v.visit_control_dependence(&dependent, instance)
                    });
                }
            }
        }
        self.drained = drained;

        let info = self
            .simulator
            .simulate(program, instance, &mut self.frames)?;

        emit(self.sinks, Capabilities::INSTRUCTION_EXECUTIONS, |v| {
            v.visit_instruction_execution(instance, &info.defined)
        });

        if track_control {
            self.control_dependences(instance, opcode.is_label(), info.is_catch_block);
        }

        // Defines
        for location in &info.defined {
            if !location.is_stack_slot()
                && self.capabilities.intersects(
                    Capabilities::DATA_DEPENDENCES_WAR | Capabilities::PENDING_DATA_DEPENDENCES_WAR,
                )
            {
                let previous = self.index.set_writer(*location, *instance);
                if let Some(previous) = previous {
                    emit(self.sinks, Capabilities::PENDING_DATA_DEPENDENCES_WAR, |v| {
                        v.discard_pending_data_dependence(
                            &previous,
                            location,
                            DataDependenceType::WriteAfterRead,
                        )
                    });
                }
                emit(self.sinks, Capabilities::PENDING_DATA_DEPENDENCES_WAR, |v| {
                    v.visit_pending_data_dependence(
                        instance,
                        location,
                        DataDependenceType::WriteAfterRead,
                    )
                });
            }
            if self.capabilities.intersects(
                Capabilities::DATA_DEPENDENCES_RAW | Capabilities::PENDING_DATA_DEPENDENCES_RAW,
            ) {
                let used = info.used_for(location);
                for reader in self.index.take_readers(location) {
                    emit(self.sinks, Capabilities::DATA_DEPENDENCES_RAW, |v| {
                        v.visit_data_dependence(
                            &reader,
                            instance,
                            location,
                            used,
                            DataDependenceType::ReadAfterWrite,
                        )
                    });
                    emit(self.sinks, Capabilities::PENDING_DATA_DEPENDENCES_RAW, |v| {
                        v.discard_pending_data_dependence(
                            &reader,
                            location,
                            DataDependenceType::ReadAfterWrite,
                        )
                    });
                }
            }
        }

        // Uses
        for location in &info.used {
            if !location.is_stack_slot()
                && self.capabilities.contains(Capabilities::DATA_DEPENDENCES_WAR)
            {
                if let Some(writer) = self.index.writer(location).copied() {
                    if writer.counter != instance.counter {
                        emit(self.sinks, Capabilities::DATA_DEPENDENCES_WAR, |v| {
                            v.visit_data_dependence(
                                &writer,
                                instance,
                                location,
                                &[],
                                DataDependenceType::WriteAfterRead,
                            )
                        });
                    }
                }
            }
            if self.capabilities.intersects(
                Capabilities::DATA_DEPENDENCES_RAW | Capabilities::PENDING_DATA_DEPENDENCES_RAW,
            ) {
                self.index.push_reader(*location, *instance);
                emit(self.sinks, Capabilities::PENDING_DATA_DEPENDENCES_RAW, |v| {
                    v.visit_pending_data_dependence(
                        instance,
                        location,
                        DataDependenceType::ReadAfterWrite,
                    )
                });
            }
        }

        for object in &info.created_objects {
            let evicted = self.index.evict_object(*object);
            self.discard(evicted);
            emit(self.sinks, Capabilities::OBJECT_CREATION, |v| {
                v.visit_object_creation(*object, instance)
            });
        }

        Ok(())
    }

    fn control_dependences(&mut self, instance: &Instance, is_label: bool, is_catch_block: bool) {
        let dependents = self.control.dependents(self.program, instance);
        let frame = match self.frames.top_mut() {
            Some(frame) => frame,
            None => return,
        };

        let mut resolved = vec![];
        for dependent in dependents {
            if let Some(instances) = frame.interesting.remove(dependent) {
                resolved.extend(instances);
            }
        }
        if is_catch_block {
            // The handler only runs because an exception was caught here
            resolved.extend(frame.take_interesting());
        } else if !is_label && frame.interrupted_control_flow {
            // Control got here abnormally, so everything seen since is decided by this instance
            resolved.extend(frame.take_interesting());
            frame.interrupted_control_flow = false;
            frame.at_catch_block_start = None;
        }
        let throws = !is_label && std::mem::take(&mut frame.throws);

        if throws {
            let catch = self
                .frames
                .iter_mut()
                .find_map(|frame| {
                    let catch = frame.at_catch_block_start.take()?;
                    Some((frame, catch))
                })
                .and_then(|(frame, catch)| {
                    let waiting = frame.interesting.get_mut(&catch.instruction)?;
                    let idx = waiting.iter().position(|inst| inst.counter == catch.counter)?;
                    let catch = waiting.remove(idx);
                    if waiting.is_empty() {
                        frame.interesting.remove(&catch.instruction);
                    }
                    Some(catch)
                });
            resolved.extend(catch);
        }

        resolved.sort_unstable_by(|a, b| b.counter.cmp(&a.counter));
        for dependent in &resolved {
            emit(self.sinks, Capabilities::CONTROL_DEPENDENCES, |v| {
                v.visit_control_dependence(dependent, instance)
            });
        }

        if let Some(frame) = self.frames.top_mut() {
            if is_catch_block {
                frame.at_catch_block_start = Some(*instance);
                frame.interrupted_control_flow = true;
            }
            frame.add_interesting(*instance);
        }
        emit(self.sinks, Capabilities::PENDING_CONTROL_DEPENDENCES, |v| {
            v.visit_pending_control_dependence(instance)
        });
    }

    /// Report evicted entries as discarded, writers first
    fn discard(&mut self, evicted: Evicted) {
        for (location, writer) in &evicted.writers {
            emit(self.sinks, Capabilities::PENDING_DATA_DEPENDENCES_WAR, |v| {
                v.discard_pending_data_dependence(
                    writer,
                    location,
                    DataDependenceType::WriteAfterRead,
                )
            });
        }
        for (location, readers) in &evicted.readers {
            for reader in readers {
                emit(self.sinks, Capabilities::PENDING_DATA_DEPENDENCES_RAW, |v| {
                    v.discard_pending_data_dependence(
                        reader,
                        location,
                        DataDependenceType::ReadAfterWrite,
                    )
                });
            }
        }
    }
}
