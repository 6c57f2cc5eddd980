mod fixtures;

use dynslice::dependences::*;
use dynslice::program::MethodId;
use dynslice::trace::{Instance, ObjectId};
use dynslice::Settings;
use fixtures::Fixture;
use std::collections::HashSet;

/// Writes every event down as a line of text
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl DependencesVisitor for Recorder {
    fn visit_instruction_execution(&mut self, instance: &Instance, written: &[StorageLocation]) {
        let written: Vec<String> = written.iter().map(|loc| loc.to_string()).collect();
        self.events.push(format!(
            "exec {} [{}]",
            instance.counter,
            written.join(", ")
        ));
    }

    fn visit_method_entry(&mut self, method: MethodId, depth: u32) {
        self.events.push(format!("entry {} {}", method.0, depth));
    }

    fn visit_method_leave(&mut self, method: MethodId, depth: u32) {
        self.events.push(format!("leave {} {}", method.0, depth));
    }

    fn visit_object_creation(&mut self, object: ObjectId, instance: &Instance) {
        self.events
            .push(format!("create {} {}", object.0, instance.counter));
    }

    fn visit_control_dependence(&mut self, from: &Instance, to: &Instance) {
        self.events
            .push(format!("control {} -> {}", from.counter, to.counter));
    }

    fn visit_pending_control_dependence(&mut self, instance: &Instance) {
        self.events
            .push(format!("pending control {}", instance.counter));
    }

    fn visit_data_dependence(
        &mut self,
        from: &Instance,
        to: &Instance,
        location: &StorageLocation,
        _used: &[StorageLocation],
        kind: DataDependenceType,
    ) {
        self.events.push(format!(
            "{:?} {} -> {} {}",
            kind, from.counter, to.counter, location
        ));
    }

    fn visit_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        self.events.push(format!(
            "pending {:?} {} {}",
            kind, instance.counter, location
        ));
    }

    fn discard_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        self.events.push(format!(
            "discard {:?} {} {}",
            kind, instance.counter, location
        ));
    }

    fn visit_end(&mut self, instances: u64) {
        self.events.push(format!("end {}", instances));
    }

    fn interrupted(&mut self) {
        self.events.push("interrupted".to_string());
    }
}

fn record(fixture: &Fixture, capabilities: Capabilities, settings: &Settings) -> Vec<String> {
    let mut recorder = Recorder::default();
    {
        let mut extractor = DependencesExtractor::new(&fixture.program);
        extractor.register(&mut recorder, capabilities);
        extractor
            .process(
                fixture.thread.backward_iterator(&fixture.program),
                settings,
            )
            .unwrap();
    }
    recorder.events
}

fn all_fixtures() -> Vec<Fixture> {
    vec![
        fixtures::simple1(),
        fixtures::branchy(),
        fixtures::objects(),
        fixtures::loops(),
        fixtures::exceptions(),
        fixtures::countdown(20),
    ]
}

#[test]
fn extraction_is_deterministic() {
    for fixture in all_fixtures() {
        let first = record(&fixture, Capabilities::all(), &Settings::new());
        let second = record(&fixture, Capabilities::all(), &Settings::new());
        assert_eq!(first, second);
        assert_eq!(
            first.last(),
            Some(&format!("end {}", fixture.thread.instructions.as_slice().len()))
        );
    }
}

#[test]
fn every_mode_sees_the_same_events() {
    for fixture in all_fixtures() {
        let serial = record(&fixture, Capabilities::all(), &Settings::new());

        let mut parallel = Settings::new();
        parallel.parallel = true;
        parallel.worker_threads = 3;
        parallel.stamp_instances = 2;
        parallel.max_buffered_events = 5;
        assert_eq!(record(&fixture, Capabilities::all(), &parallel), serial);

        let mut pipelined = Settings::new();
        pipelined.pipelined = true;
        pipelined.pipeline_capacity = 1;
        assert_eq!(record(&fixture, Capabilities::all(), &pipelined), serial);

        parallel.pipelined = true;
        parallel.pipeline_capacity = 4;
        assert_eq!(record(&fixture, Capabilities::all(), &parallel), serial);
    }
}

#[test]
fn visitors_only_get_what_they_asked_for() {
    let fixture = fixtures::loops();
    let everything = record(&fixture, Capabilities::all(), &Settings::new());
    let control = record(
        &fixture,
        Capabilities::CONTROL_DEPENDENCES,
        &Settings::new(),
    );

    let expected: Vec<String> = everything
        .iter()
        .filter(|event| event.starts_with("control ") || event.starts_with("end "))
        .cloned()
        .collect();
    assert_eq!(control, expected);
    assert!(control.len() > 1);
}

#[test]
fn two_visitors_with_different_needs() {
    let fixture = fixtures::branchy();
    let mut data = Recorder::default();
    let mut frames = Recorder::default();
    {
        let mut extractor = DependencesExtractor::new(&fixture.program);
        extractor.register(&mut data, Capabilities::DATA_DEPENDENCES_RAW);
        extractor.register(&mut frames, Capabilities::METHOD_ENTRY_LEAVE);
        assert_eq!(
            extractor.capabilities(),
            Capabilities::DATA_DEPENDENCES_RAW | Capabilities::METHOD_ENTRY_LEAVE
        );
        let mut settings = Settings::new();
        settings.parallel = true;
        settings.worker_threads = 2;
        settings.stamp_instances = 1;
        extractor
            .process(
                fixture.thread.backward_iterator(&fixture.program),
                &settings,
            )
            .unwrap();
    }
    assert!(data
        .events
        .iter()
        .all(|event| event.starts_with("ReadAfterWrite") || event.starts_with("end ")));
    assert!(frames
        .events
        .iter()
        .all(|event| event.starts_with("entry")
            || event.starts_with("leave")
            || event.starts_with("end ")));
    assert!(frames.events.iter().any(|event| event.starts_with("leave")));
}

/// Checks that pending dependences are opened once and closed once
#[derive(Default)]
struct PendingBook {
    open: HashSet<(u64, StorageLocation, bool)>,
    violations: Vec<String>,
}

impl DependencesVisitor for PendingBook {
    fn visit_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        let key = (
            instance.counter,
            *location,
            kind == DataDependenceType::ReadAfterWrite,
        );
        if !self.open.insert(key) {
            self.violations
                .push(format!("pending twice: {} {}", instance.counter, location));
        }
    }

    fn discard_pending_data_dependence(
        &mut self,
        instance: &Instance,
        location: &StorageLocation,
        kind: DataDependenceType,
    ) {
        let key = (
            instance.counter,
            *location,
            kind == DataDependenceType::ReadAfterWrite,
        );
        if !self.open.remove(&key) {
            self.violations
                .push(format!("discard without pending: {} {}", instance.counter, location));
        }
    }
}

#[test]
fn pending_dependences_are_all_discarded() {
    for fixture in all_fixtures() {
        let mut book = PendingBook::default();
        {
            let mut extractor = DependencesExtractor::new(&fixture.program);
            extractor.register(&mut book, Capabilities::all());
            extractor
                .process(
                    fixture.thread.backward_iterator(&fixture.program),
                    &Settings::new(),
                )
                .unwrap();
        }
        assert!(book.violations.is_empty(), "{:?}", book.violations);
        assert!(book.open.is_empty(), "{:?}", book.open);
    }
}

/// Follows method entries and leaves as a stack
#[derive(Default)]
struct FrameBook {
    stack: Vec<(MethodId, u32)>,
    violations: Vec<String>,
}

impl DependencesVisitor for FrameBook {
    fn visit_method_leave(&mut self, method: MethodId, depth: u32) {
        self.stack.push((method, depth));
        if depth as usize != self.stack.len() {
            self.violations
                .push(format!("leave of {:?} at depth {}", method, depth));
        }
    }

    fn visit_method_entry(&mut self, method: MethodId, depth: u32) {
        if self.stack.pop() != Some((method, depth)) {
            self.violations
                .push(format!("entry of {:?} at depth {}", method, depth));
        }
    }
}

#[test]
fn frames_nest_properly() {
    for fixture in all_fixtures() {
        let mut book = FrameBook::default();
        {
            let mut extractor = DependencesExtractor::new(&fixture.program);
            extractor.register(&mut book, Capabilities::METHOD_ENTRY_LEAVE);
            extractor
                .process(
                    fixture.thread.backward_iterator(&fixture.program),
                    &Settings::new(),
                )
                .unwrap();
        }
        assert!(book.violations.is_empty(), "{:?}", book.violations);

        // Only the outermost frame may still be open once the trace ran out
        assert!(book.stack.len() <= 1);
    }
}

/// Watches for events on objects that were already created
#[derive(Default)]
struct CreationBook {
    created: HashSet<ObjectId>,
    late: Vec<String>,
}

impl CreationBook {
    fn check(&mut self, location: &StorageLocation) {
        if let Some(object) = location.object() {
            if self.created.contains(&object) {
                self.late.push(location.to_string());
            }
        }
    }
}

impl DependencesVisitor for CreationBook {
    fn visit_object_creation(&mut self, object: ObjectId, _instance: &Instance) {
        self.created.insert(object);
    }

    fn visit_data_dependence(
        &mut self,
        _from: &Instance,
        _to: &Instance,
        location: &StorageLocation,
        _used: &[StorageLocation],
        _kind: DataDependenceType,
    ) {
        self.check(location);
    }

    fn visit_pending_data_dependence(
        &mut self,
        _instance: &Instance,
        location: &StorageLocation,
        _kind: DataDependenceType,
    ) {
        self.check(location);
    }
}

#[test]
fn nothing_happens_to_an_object_before_its_creation() {
    let fixture = fixtures::objects();
    let mut book = CreationBook::default();
    {
        let mut extractor = DependencesExtractor::new(&fixture.program);
        extractor.register(&mut book, Capabilities::all());
        extractor
            .process(
                fixture.thread.backward_iterator(&fixture.program),
                &Settings::new(),
            )
            .unwrap();
    }
    assert!(book.created.contains(&ObjectId(42)));
    assert!(book.late.is_empty(), "{:?}", book.late);
}

#[test]
fn field_dependences_connect_writer_and_reader() {
    let fixture = fixtures::objects();
    let events = record(
        &fixture,
        Capabilities::DATA_DEPENDENCES_RAW,
        &Settings::new(),
    );

    // get_value is the 11th instance forward, put_value the 6th (the entry label is the 1st)
    let field = events
        .iter()
        .filter(|event| event.contains("obj42"))
        .collect::<Vec<_>>();
    assert_eq!(field.len(), 1, "{:?}", field);
    assert!(field[0].starts_with("ReadAfterWrite 11 -> 6 "), "{}", field[0]);
}

#[test]
fn handler_is_controlled_by_the_catch_across_frames() {
    let fixture = fixtures::exceptions();
    let events = record(
        &fixture,
        Capabilities::CONTROL_DEPENDENCES,
        &Settings::new(),
    );

    // throw is the 6th instance, the catch label the 8th and the store into r the 11th
    for expected in ["control 9 -> 8", "control 10 -> 8", "control 11 -> 8", "control 8 -> 6"] {
        assert!(events.contains(&expected.to_string()), "{}: {:?}", expected, events);
    }

    // The handler does not run because of the call, the exception decides it
    assert!(!events.contains(&"control 11 -> 3".to_string()));
}

#[test]
fn corrupted_traces_fail_cleanly() {
    let mut fixture = fixtures::objects();

    // Values for the field accesses went missing
    fixture.thread.values = Default::default();
    let mut recorder = Recorder::default();
    let mut extractor = DependencesExtractor::new(&fixture.program);
    extractor.register(&mut recorder, Capabilities::all());
    let result = extractor.process(
        fixture.thread.backward_iterator(&fixture.program),
        &Settings::new(),
    );
    assert!(matches!(result, Err(Error::Trace(_))));
}
