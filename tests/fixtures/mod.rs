use dynslice::program::*;
use dynslice::trace::{ThreadTrace, ThreadTraceBuilder};
use std::collections::HashMap;
use std::ops::Index;

/// Small program together with one recorded run of it
///
/// Interesting instructions are kept under a name, so that tests can state expectations without
/// counting instruction indices.
pub struct Fixture {
    pub program: Program,
    pub thread: ThreadTrace,
    named: HashMap<&'static str, InstrId>,
}

impl Fixture {
    fn new(program: Program, thread: ThreadTrace, named: &[(&'static str, InstrId)]) -> Fixture {
        Fixture {
            program,
            thread,
            named: named.iter().copied().collect(),
        }
    }

    /// Instructions registered under `names`
    pub fn all(&self, names: &[&str]) -> Vec<InstrId> {
        names.iter().map(|name| self[*name]).collect()
    }
}

impl Index<&str> for Fixture {
    type Output = InstrId;

    fn index(&self, name: &str) -> &InstrId {
        match self.named.get(name) {
            Some(instr) => instr,
            None => panic!("fixture has no instruction named {}", name),
        }
    }
}

/// ```text
/// static void main(String[] args) {
///   int a = args[0].charAt(0) - '0';    // line 7
///   int b = 2 * a;                      // line 8
///   int c = b + a;                      // line 9
/// }                                     // line 10
/// ```
pub fn simple1() -> Fixture {
    let mut builder = ProgramBuilder::new();
    let mut main = builder.method("Simple1", "main", 1, false, true);
    main.local("args", 0)
        .local("a", 1)
        .local("b", 2)
        .local("c", 3);

    main.line(7);
    let load_args = main.push(Opcode::Load(0));
    let zero = main.push(Opcode::Const(0));
    let array_load = main.push(Opcode::ArrayLoad);
    let index = main.push(Opcode::Const(0));
    let char_at = main.push(Opcode::Invoke(
        InvokeKind::Virtual,
        CalleeRef {
            class_name: "java.lang.String".to_string(),
            name: "charAt".to_string(),
            argument_slots: 2,
            returns_value: true,
        },
    ));
    let ascii_zero = main.push(Opcode::Const(48));
    let sub = main.push(Opcode::Binary(BinaryOp::Sub));
    let store_a = main.push(Opcode::Store(1));

    main.line(8);
    let two = main.push(Opcode::Const(2));
    let load_a = main.push(Opcode::Load(1));
    let mul = main.push(Opcode::Binary(BinaryOp::Mul));
    let store_b = main.push(Opcode::Store(2));

    main.line(9);
    let load_b = main.push(Opcode::Load(2));
    let load_a_again = main.push(Opcode::Load(1));
    let add = main.push(Opcode::Binary(BinaryOp::Add));
    let store_c = main.push(Opcode::Store(3));

    main.line(10);
    let ret = main.push(Opcode::Return(false));
    let main = main.finish().unwrap();
    let program = builder.finish();

    let method = program.method(main);
    let mut thread = ThreadTraceBuilder::new(1, "main");
    thread
        .execute(method.entry_label())
        .execute_all(&[load_args, zero])
        .execute_with(array_load, &[100, 0])
        .execute_all(&[
            index,
            char_at,
            ascii_zero,
            sub,
            store_a,
            two,
            load_a,
            mul,
            store_b,
            load_b,
            load_a_again,
            add,
            store_c,
            ret,
        ])
        .execute(method.leave_label());
    let thread = thread.finish();

    Fixture::new(
        program,
        thread,
        &[
            ("load_args", load_args),
            ("zero", zero),
            ("array_load", array_load),
            ("index", index),
            ("char_at", char_at),
            ("ascii_zero", ascii_zero),
            ("sub", sub),
            ("store_a", store_a),
            ("two", two),
            ("load_a", load_a),
            ("mul", mul),
            ("store_b", store_b),
            ("load_b", load_b),
            ("load_a_again", load_a_again),
            ("add", add),
            ("store_c", store_c),
            ("ret", ret),
        ],
    )
}

/// ```text
/// static void main(String[] args) {
///   int n = args.length;              // line 3
///   int m = abs(n);                   // line 4
/// }                                   // line 5
///
/// static int abs(int x) {
///   if (x < 0)                        // line 12
///     return -x;                      // line 13
///   return x;                         // line 14
/// }
/// ```
///
/// The recorded run takes the `return x` path.
pub fn branchy() -> Fixture {
    let mut builder = ProgramBuilder::new();

    let mut abs = builder.method("Branchy", "abs", 1, true, true);
    abs.local("x", 0);
    abs.line(12);
    let load_x = abs.push(Opcode::Load(0));
    let positive = abs.fresh_label();
    let branch = abs.branch(Condition::Ge, positive);
    abs.line(13);
    let load_negated = abs.push(Opcode::Load(0));
    let negate = abs.push(Opcode::Unary(UnaryOp::Neg));
    let return_negated = abs.push(Opcode::Return(true));
    abs.line(14);
    let positive_label = abs.place(positive);
    let load_positive = abs.push(Opcode::Load(0));
    let return_positive = abs.push(Opcode::Return(true));
    let abs = abs.finish().unwrap();

    let mut main = builder.method("Branchy", "main", 1, false, true);
    main.local("args", 0).local("n", 1).local("m", 2);
    main.line(3);
    let load_args = main.push(Opcode::Load(0));
    let length = main.push(Opcode::ArrayLength);
    let store_n = main.push(Opcode::Store(1));
    main.line(4);
    let load_n = main.push(Opcode::Load(1));
    let invoke = main.push(Opcode::Invoke(
        InvokeKind::Static,
        CalleeRef {
            class_name: "Branchy".to_string(),
            name: "abs".to_string(),
            argument_slots: 1,
            returns_value: true,
        },
    ));
    let store_m = main.push(Opcode::Store(2));
    main.line(5);
    let ret = main.push(Opcode::Return(false));
    let main = main.finish().unwrap();
    let program = builder.finish();

    let (main_method, abs_method) = (program.method(main), program.method(abs));
    let mut thread = ThreadTraceBuilder::new(1, "main");
    thread
        .execute(main_method.entry_label())
        .execute_all(&[load_args, length, store_n, load_n, invoke])
        .execute(abs_method.entry_label())
        .execute_all(&[
            load_x,
            branch,
            positive_label,
            load_positive,
            return_positive,
        ])
        .execute(abs_method.leave_label())
        .execute_all(&[store_m, ret])
        .execute(main_method.leave_label());
    let thread = thread.finish();

    Fixture::new(
        program,
        thread,
        &[
            ("load_x", load_x),
            ("branch", branch),
            ("load_negated", load_negated),
            ("negate", negate),
            ("return_negated", return_negated),
            ("positive_label", positive_label),
            ("load_positive", load_positive),
            ("return_positive", return_positive),
            ("load_args", load_args),
            ("length", length),
            ("store_n", store_n),
            ("load_n", load_n),
            ("invoke", invoke),
            ("store_m", store_m),
            ("ret", ret),
        ],
    )
}

/// ```text
/// static int run() {
///   Box b = new Box();                // line 3
///   b.value = 5;                      // line 4
///   b.other = 7;                      // line 5
///   int x = b.value;                  // line 6
///   return x;                         // line 7
/// }
/// ```
///
/// The box is recorded as object 42.
pub fn objects() -> Fixture {
    let mut builder = ProgramBuilder::new();
    let value = builder.add_field("Box", "value");
    let other = builder.add_field("Box", "other");

    let mut run = builder.method("Objects", "run", 0, true, true);
    run.local("b", 0).local("x", 1);
    run.line(3);
    let new = run.push(Opcode::New("Box".to_string()));
    let store_b = run.push(Opcode::Store(0));
    run.line(4);
    let load_b = run.push(Opcode::Load(0));
    let five = run.push(Opcode::Const(5));
    let put_value = run.push(Opcode::PutField(value));
    run.line(5);
    let load_b_other = run.push(Opcode::Load(0));
    let seven = run.push(Opcode::Const(7));
    let put_other = run.push(Opcode::PutField(other));
    run.line(6);
    let load_b_get = run.push(Opcode::Load(0));
    let get_value = run.push(Opcode::GetField(value));
    let store_x = run.push(Opcode::Store(1));
    run.line(7);
    let load_x = run.push(Opcode::Load(1));
    let ret = run.push(Opcode::Return(true));
    let run = run.finish().unwrap();
    let program = builder.finish();

    let method = program.method(run);
    let mut thread = ThreadTraceBuilder::new(1, "main");
    thread
        .execute(method.entry_label())
        .execute_with(new, &[42])
        .execute_all(&[store_b, load_b, five])
        .execute_with(put_value, &[42])
        .execute_all(&[load_b_other, seven])
        .execute_with(put_other, &[42])
        .execute(load_b_get)
        .execute_with(get_value, &[42])
        .execute_all(&[store_x, load_x, ret])
        .execute(method.leave_label());
    let thread = thread.finish();

    Fixture::new(
        program,
        thread,
        &[
            ("new", new),
            ("store_b", store_b),
            ("load_b", load_b),
            ("five", five),
            ("put_value", put_value),
            ("load_b_other", load_b_other),
            ("seven", seven),
            ("put_other", put_other),
            ("load_b_get", load_b_get),
            ("get_value", get_value),
            ("store_x", store_x),
            ("load_x", load_x),
            ("ret", ret),
        ],
    )
}

/// ```text
/// static int sum(int n) {
///   int s = 0;                        // line 3
///   int i = 0;                        // line 4
///   while (i < n) {                   // line 5
///     s = s + i;                      // line 6
///     i++;                            // line 5
///   }
///   return s;                         // line 7
/// }
///
/// static void main() {
///   int total = sum(2);               // line 11
/// }                                   // line 12
/// ```
pub fn loops() -> Fixture {
    let mut builder = ProgramBuilder::new();

    let mut sum = builder.method("Loops", "sum", 1, true, true);
    sum.local("n", 0).local("s", 1).local("i", 2);
    sum.line(3);
    let init_s = [sum.push(Opcode::Const(0)), sum.push(Opcode::Store(1))];
    sum.line(4);
    let init_i = [sum.push(Opcode::Const(0)), sum.push(Opcode::Store(2))];
    let condition = sum.fresh_label();
    let done = sum.fresh_label();
    sum.line(5);
    let condition_label = sum.place(condition);
    let load_i = sum.push(Opcode::Load(2));
    let load_n = sum.push(Opcode::Load(0));
    let exit = sum.branch_cmp(Condition::Ge, done);
    sum.line(6);
    let body = [
        sum.push(Opcode::Load(1)),
        sum.push(Opcode::Load(2)),
        sum.push(Opcode::Binary(BinaryOp::Add)),
        sum.push(Opcode::Store(1)),
    ];
    sum.line(5);
    let increment = sum.push(Opcode::IInc(2, 1));
    let back = sum.goto(condition);
    sum.line(7);
    let done_label = sum.place(done);
    let load_s = sum.push(Opcode::Load(1));
    let ret_s = sum.push(Opcode::Return(true));
    let sum = sum.finish().unwrap();

    let mut main = builder.method("Loops", "main", 0, false, true);
    main.local("total", 0);
    main.line(11);
    let two = main.push(Opcode::Const(2));
    let invoke = main.push(Opcode::Invoke(
        InvokeKind::Static,
        CalleeRef {
            class_name: "Loops".to_string(),
            name: "sum".to_string(),
            argument_slots: 1,
            returns_value: true,
        },
    ));
    let store_total = main.push(Opcode::Store(0));
    main.line(12);
    let ret = main.push(Opcode::Return(false));
    let main = main.finish().unwrap();
    let program = builder.finish();

    let (main_method, sum_method) = (program.method(main), program.method(sum));
    let mut thread = ThreadTraceBuilder::new(1, "main");
    thread
        .execute(main_method.entry_label())
        .execute_all(&[two, invoke])
        .execute(sum_method.entry_label())
        .execute_all(&init_s)
        .execute_all(&init_i);
    for _ in 0..2 {
        thread
            .execute_all(&[condition_label, load_i, load_n, exit])
            .execute_all(&body)
            .execute_all(&[increment, back]);
    }
    thread
        .execute_all(&[condition_label, load_i, load_n, exit])
        .execute_all(&[done_label, load_s, ret_s])
        .execute(sum_method.leave_label())
        .execute_all(&[store_total, ret])
        .execute(main_method.leave_label());
    let thread = thread.finish();

    Fixture::new(
        program,
        thread,
        &[
            ("load_i", load_i),
            ("load_n", load_n),
            ("exit", exit),
            ("add", body[2]),
            ("store_s", body[3]),
            ("increment", increment),
            ("back", back),
            ("load_s", load_s),
            ("ret_s", ret_s),
            ("two", two),
            ("invoke", invoke),
            ("store_total", store_total),
            ("ret", ret),
        ],
    )
}

/// ```text
/// static void boom() {
///   throw null;                         // line 10
/// }
///
/// static void main() {
///   try {
///     boom();                           // line 3
///   } catch (Exception e) {
///     r = 5;                            // line 5
///   }
/// }                                     // line 6
/// ```
pub fn exceptions() -> Fixture {
    let mut builder = ProgramBuilder::new();

    let mut boom = builder.method("Exceptions", "boom", 0, false, true);
    boom.line(10);
    let null = boom.push(Opcode::Const(0));
    let throw = boom.push(Opcode::Throw);
    let boom = boom.finish().unwrap();

    let mut main = builder.method("Exceptions", "main", 0, false, true);
    main.local("r", 0);
    let (start, end) = (main.fresh_label(), main.fresh_label());
    let (handler, after) = (main.fresh_label(), main.fresh_label());
    main.line(3);
    let try_start = main.place(start);
    let invoke = main.push(Opcode::Invoke(
        InvokeKind::Static,
        CalleeRef {
            class_name: "Exceptions".to_string(),
            name: "boom".to_string(),
            argument_slots: 0,
            returns_value: false,
        },
    ));
    main.place(end);
    main.goto(after);
    main.line(5);
    let catch = main.place_catch(handler);
    let pop = main.push(Opcode::Pop);
    let five = main.push(Opcode::Const(5));
    let store_r = main.push(Opcode::Store(0));
    main.line(6);
    let after_label = main.place(after);
    let ret = main.push(Opcode::Return(false));
    main.handler(start, end, handler);
    let main = main.finish().unwrap();
    let program = builder.finish();

    let (main_method, boom_method) = (program.method(main), program.method(boom));
    let mut thread = ThreadTraceBuilder::new(1, "main");
    thread
        .execute_all(&[main_method.entry_label(), try_start, invoke])
        .execute_all(&[boom_method.entry_label(), null, throw])
        .execute(boom_method.abnormal_termination_label())
        .execute_all(&[catch, pop, five, store_r, after_label, ret])
        .execute(main_method.leave_label());
    let thread = thread.finish();

    Fixture::new(
        program,
        thread,
        &[
            ("null", null),
            ("throw", throw),
            ("invoke", invoke),
            ("catch", catch),
            ("pop", pop),
            ("five", five),
            ("store_r", store_r),
            ("ret", ret),
        ],
    )
}

/// ```text
/// static void run() {
///   int i = <iterations>;               // line 3
///   int s = 0;                          // line 4
///   while (i != 0) {                    // line 5
///     s = s + i;                        // line 6
///     i--;                              // line 7
///   }
///   int result = s;                     // line 8
/// }                                     // line 9
/// ```
pub fn countdown(iterations: usize) -> Fixture {
    let mut builder = ProgramBuilder::new();
    let mut run = builder.method("Countdown", "run", 0, false, true);
    run.local("i", 0).local("s", 1).local("result", 2);
    run.line(3);
    let init_i = [run.push(Opcode::Const(iterations as i64)), run.push(Opcode::Store(0))];
    run.line(4);
    let init_s = [run.push(Opcode::Const(0)), run.push(Opcode::Store(1))];
    let (header, done) = (run.fresh_label(), run.fresh_label());
    run.line(5);
    let header_label = run.place(header);
    let load_i = run.push(Opcode::Load(0));
    let exit = run.branch(Condition::Eq, done);
    run.line(6);
    let body = [
        run.push(Opcode::Load(1)),
        run.push(Opcode::Load(0)),
        run.push(Opcode::Binary(BinaryOp::Add)),
        run.push(Opcode::Store(1)),
    ];
    run.line(7);
    let decrement = run.push(Opcode::IInc(0, -1));
    let back = run.goto(header);
    run.line(8);
    let done_label = run.place(done);
    let load_s = run.push(Opcode::Load(1));
    let store_result = run.push(Opcode::Store(2));
    run.line(9);
    let ret = run.push(Opcode::Return(false));
    let run = run.finish().unwrap();
    let program = builder.finish();

    let method = program.method(run);
    let mut thread = ThreadTraceBuilder::new(1, "main");
    thread
        .execute(method.entry_label())
        .execute_all(&init_i)
        .execute_all(&init_s);
    for _ in 0..iterations {
        thread
            .execute_all(&[header_label, load_i, exit])
            .execute_all(&body)
            .execute_all(&[decrement, back]);
    }
    thread
        .execute_all(&[header_label, load_i, exit])
        .execute_all(&[done_label, load_s, store_result, ret])
        .execute(method.leave_label());
    let thread = thread.finish();

    Fixture::new(
        program,
        thread,
        &[
            ("init_i", init_i[0]),
            ("init_s", init_s[0]),
            ("exit", exit),
            ("add", body[2]),
            ("store_s", body[3]),
            ("decrement", decrement),
            ("load_s", load_s),
            ("store_result", store_result),
        ],
    )
}
