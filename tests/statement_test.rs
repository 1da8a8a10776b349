mod common;
use basic::mach::*;
use common::*;

const A: SlotId = 0;
const B: SlotId = 1;
const C: SlotId = 2;
const D: SlotId = 3;
const M: SlotId = 4;
const SLOTS: usize = 6;

fn dim(slot: SlotId, dims: Vec<(Option<i64>, i64)>, preserve: bool) -> Opcode {
    Opcode::Dim {
        place: Place::var(slot),
        dims: dims
            .into_iter()
            .map(|(lower, upper)| Dim {
                lower: lower.map(int),
                upper: int(upper),
            })
            .collect(),
        preserve,
    }
}

fn array(items: &[i64]) -> Expr {
    Expr::Array(items.iter().map(|&n| int(n)).collect())
}

#[test]
fn test_const_is_read_only() {
    let ops = vec![
        Opcode::Const {
            place: Place::var(A),
            expr: int(1),
        },
        Opcode::Try { catch_ip: 3 },
        set(A, int(2)),
        Opcode::Catch {
            end_ip: 5,
            var: Some(Place::var(B)),
        },
        print(vec![var(B)]),
        Opcode::EndTry,
        print(vec![var(A)]),
        Opcode::Erase(vec![Place::var(A)]),
        set(A, int(3)),
        print(vec![var(A)]),
    ];
    assert_eq!(run(ops, SLOTS), "ASSIGNMENT TO CONSTANT\n1\n3\n");
}

#[test]
fn test_dim_and_elements() {
    let ops = vec![
        dim(A, vec![(Some(1), 3)], false),
        Opcode::Let {
            place: Place::var(A).index(vec![int(2)]),
            expr: int(5),
        },
        print(vec![var(A)]),
        dim(B, vec![(None, 1), (None, 1)], false),
        Opcode::Let {
            place: Place::var(B).index(vec![int(1), int(0)]),
            expr: Expr::str("x"),
        },
        print(vec![var(B)]),
        print(vec![Expr::Var(Place::var(A).index(vec![int(4)]))]),
    ];
    assert_eq!(
        run(ops, SLOTS),
        "[,5,]\n[,,\"x\",]\n?SUBSCRIPT OUT OF RANGE\n"
    );
}

#[test]
fn test_dim_preserve() {
    let ops = vec![
        set(A, array(&[1, 2, 3])),
        dim(A, vec![(None, 4)], true),
        print(vec![var(A)]),
        dim(A, vec![(None, 1)], true),
        print(vec![var(A)]),
        dim(A, vec![(None, 1), (None, 1)], true),
    ];
    assert_eq!(run(ops, SLOTS), "[1,2,3,,]\n[1,2]\n?DIMENSION MISMATCH\n");
}

#[test]
fn test_dim_without_bounds_is_empty() {
    let ops = vec![
        set(A, int(1)),
        dim(A, vec![], false),
        print(vec![var(A)]),
    ];
    assert_eq!(run(ops, SLOTS), "[]\n");
}

#[test]
fn test_append() {
    let ops = vec![
        set(A, int(1)),
        Opcode::Append {
            place: Place::var(A),
            items: vec![int(2), int(3)],
        },
        Opcode::Append {
            place: Place::var(B),
            items: vec![Expr::str("x")],
        },
        print(vec![var(A), Expr::str(" "), var(B)]),
    ];
    assert_eq!(run(ops, SLOTS), "[1,2,3] [\"x\"]\n");
}

#[test]
fn test_insert() {
    let ops = vec![
        set(A, array(&[1, 2, 3])),
        Opcode::Insert {
            place: Place::var(A),
            index: int(1),
            items: vec![int(8), int(9)],
        },
        Opcode::Insert {
            place: Place::var(A),
            index: int(99),
            items: vec![int(0)],
        },
        Opcode::Insert {
            place: Place::var(A),
            index: int(-5),
            items: vec![int(7)],
        },
        print(vec![var(A)]),
    ];
    assert_eq!(run(ops, SLOTS), "[7,1,8,9,2,3,0]\n");
}

#[test]
fn test_delete() {
    let delete = |index: i64, count: Option<i64>| Opcode::Delete {
        place: Place::var(A),
        index: int(index),
        count: count.map(int),
    };
    let ops = vec![
        set(A, array(&[1, 2, 3, 4, 5])),
        delete(1, Some(2)),
        delete(0, None),
        print(vec![var(A)]),
        delete(0, Some(0)),
    ];
    assert_eq!(
        run(ops, SLOTS),
        "[4,5]\n?ILLEGAL FUNCTION CALL; DELETE COUNT\n"
    );
    let ops = vec![set(A, array(&[1])), delete(3, None)];
    assert_eq!(run(ops, SLOTS), "?SUBSCRIPT OUT OF RANGE\n");
    let ops = vec![set(A, int(1)), delete(0, None)];
    assert_eq!(
        run(ops, SLOTS),
        "?ILLEGAL FUNCTION CALL; DELETE NEEDS AN ARRAY\n"
    );
}

#[test]
fn test_extreme_positions_are_errors() {
    let ops = vec![
        set(A, array(&[1, 2, 3])),
        Opcode::Delete {
            place: Place::var(A),
            index: int(1),
            count: Some(int(i64::max_value())),
        },
    ];
    assert_eq!(run(ops, SLOTS), "?SUBSCRIPT OUT OF RANGE; DELETE COUNT\n");
    let ops = vec![
        dim(A, vec![(Some(1), 3)], false),
        Opcode::Insert {
            place: Place::var(A),
            index: int(i64::min_value()),
            items: vec![int(7)],
        },
        print(vec![var(A)]),
        Opcode::Delete {
            place: Place::var(A),
            index: int(i64::min_value()),
            count: None,
        },
    ];
    assert_eq!(run(ops, SLOTS), "[7,,,]\n?SUBSCRIPT OUT OF RANGE\n");
    let ops = vec![dim(A, vec![(Some(-5), i64::max_value())], false)];
    assert_eq!(run(ops, SLOTS), "?OUT OF MEMORY; ARRAY TOO LARGE\n");
}

#[test]
fn test_swap_mixed_types() {
    let ops = vec![
        set(A, int(1)),
        set(B, array(&[2, 3])),
        Opcode::Swap(Place::var(A), Place::var(B)),
        print(vec![var(A), Expr::str(" "), var(B)]),
        Opcode::Swap(Place::var(A), Place::var(A)),
        print(vec![var(A)]),
    ];
    assert_eq!(run(ops, SLOTS), "[2,3] 1\n[2,3]\n");
}

#[test]
fn test_map_fields() {
    let ops = vec![
        Opcode::Let {
            place: Place::var(M).field("x"),
            expr: int(1),
        },
        Opcode::Let {
            place: Place::var(M).field("y").field("z"),
            expr: Expr::str("deep"),
        },
        print(vec![var(M)]),
        print(vec![Expr::Var(Place::var(M).field("y").field("z"))]),
        print(vec![Expr::Var(Place::var(M).field("missing"))]),
        Opcode::Let {
            place: Place::var(M).index(vec![Expr::str("x")]),
            expr: int(2),
        },
        print(vec![Expr::Var(Place::var(M).field("x"))]),
        set(A, int(5)),
        Opcode::Let {
            place: Place::var(A).field("x"),
            expr: int(1),
        },
    ];
    assert_eq!(
        run(ops, SLOTS),
        "{\"x\":1,\"y\":{\"z\":\"deep\"}}\ndeep\n\n2\n?TYPE MISMATCH; NOT A MAP\n"
    );
}

#[test]
fn test_literals_are_copies() {
    let ops = vec![
        set(
            M,
            Expr::Map(vec![("a".into(), array(&[1, 2])), ("b".into(), int(3))]),
        ),
        set(A, var(M)),
        Opcode::Let {
            place: Place::var(A).field("b"),
            expr: int(4),
        },
        print(vec![var(M), Expr::str(" "), var(A)]),
    ];
    assert_eq!(
        run(ops, SLOTS),
        "{\"a\":[1,2],\"b\":3} {\"a\":[1,2],\"b\":4}\n"
    );
}

#[test]
fn test_references() {
    let ops = vec![
        set(A, int(1)),
        set(B, Expr::Ref(Place::var(A))),
        set(A, int(5)),
        print(vec![var(B)]),
        call(7, vec![]),
        print(vec![Expr::str("<"), var(C), Expr::str(">")]),
        Opcode::End,
        params(&[]),
        Opcode::Local(vec![D]),
        set(D, int(9)),
        set(C, Expr::Ref(Place::var(D))),
        print(vec![var(C)]),
        Opcode::ProcReturn,
    ];
    assert_eq!(run(ops, SLOTS), "5\n9\n<>\n");
}

#[test]
fn test_circular_reference() {
    let ops = vec![
        set(A, Expr::Ref(Place::var(B))),
        set(B, Expr::Ref(Place::var(A))),
        print(vec![var(A)]),
    ];
    assert_eq!(run(ops, SLOTS), "?CIRCULAR REFERENCE\n");
}

#[test]
fn test_operators() {
    let ops = vec![
        print(vec![bin(Op::Div, int(7), int(2))]),
        print(vec![bin(Op::Div, int(6), int(2))]),
        print(vec![bin(Op::Add, Expr::str("a"), int(1))]),
        print(vec![Expr::unary(Op::Neg, int(4))]),
        print(vec![bin(Op::And, int(1), int(0)), bin(Op::Or, int(1), int(0))]),
        print(vec![bin(Op::Div, int(1), int(0))]),
    ];
    assert_eq!(run(ops, SLOTS), "3.5\n3\na1\n-4\n01\n?DIVISION BY ZERO\n");
}

#[test]
fn test_print_separators() {
    let ops = vec![
        Opcode::Print {
            target: PrintTo::Console,
            items: vec![
                PrintItem {
                    expr: int(1),
                    sep: Sep::Comma,
                },
                PrintItem {
                    expr: int(2),
                    sep: Sep::Semicolon,
                },
            ],
        },
        print(vec![int(3)]),
        print(vec![Expr::real(1.5)]),
    ];
    assert_eq!(run(ops, SLOTS), "1\t23\n1.5\n");
}

#[test]
fn test_print_to_string_and_log() {
    let ops = vec![
        set(A, Expr::str("x=")),
        Opcode::Print {
            target: PrintTo::Str(Place::var(A)),
            items: vec![PrintItem {
                expr: int(1),
                sep: Sep::Semicolon,
            }],
        },
        Opcode::Print {
            target: PrintTo::Str(Place::var(A)),
            items: vec![PrintItem {
                expr: int(2),
                sep: Sep::None,
            }],
        },
        Opcode::Print {
            target: PrintTo::Log,
            items: vec![PrintItem {
                expr: Expr::str("logged"),
                sep: Sep::None,
            }],
        },
        Opcode::Print {
            target: PrintTo::Console,
            items: vec![PrintItem {
                expr: var(A),
                sep: Sep::Semicolon,
            }],
        },
    ];
    let capture = Capture::new();
    let log = capture.log.clone();
    let (mut r, out) = runtime_with(Program::from_ops(ops, SLOTS), capture);
    assert_eq!(exec(&mut r, &out), "x=12\n");
    assert_eq!(*log.borrow(), "logged\n");
    let ops = vec![Opcode::Print {
        target: PrintTo::File(int(1)),
        items: vec![],
    }];
    assert_eq!(run(ops, SLOTS), "?BAD FILE NUMBER\n");
}

#[test]
fn test_input_fields() {
    let ops = vec![
        Opcode::Input {
            source: InputFrom::Console,
            prompt: None,
            places: vec![Place::var(A), Place::var(B), Place::var(C), Place::var(D)],
        },
        print(vec![
            var(A),
            Expr::str("|"),
            var(B),
            Expr::str("|"),
            var(C),
            Expr::str("|"),
            var(D),
            Expr::str("|"),
        ]),
        print(vec![bin(Op::Add, var(A), int(1))]),
    ];
    let capture = Capture::with_input(&["1, \"a,b\", xyz"]);
    let (mut r, out) = runtime_with(Program::from_ops(ops, SLOTS), capture);
    assert_eq!(exec(&mut r, &out), "? 1|a,b|xyz||\n2\n");
}

#[test]
fn test_input_whole_line_and_prompt() {
    let ops = vec![
        Opcode::Input {
            source: InputFrom::Console,
            prompt: Some(Expr::str("Name: ")),
            places: vec![Place::var(A)],
        },
        print(vec![Expr::str("["), var(A), Expr::str("]")]),
    ];
    let capture = Capture::with_input(&["hello, world\n"]);
    let (mut r, out) = runtime_with(Program::from_ops(ops, SLOTS), capture);
    assert_eq!(exec(&mut r, &out), "Name: [hello, world]\n");
}

#[test]
fn test_input_from_string_and_eof() {
    let ops = vec![
        set(M, Expr::str("3,4")),
        Opcode::Input {
            source: InputFrom::Str(Place::var(M)),
            prompt: None,
            places: vec![Place::var(A), Place::var(B)],
        },
        print(vec![bin(Op::Add, var(A), var(B))]),
        Opcode::Input {
            source: InputFrom::Console,
            prompt: Some(Expr::str("")),
            places: vec![Place::var(C), Place::var(D)],
        },
        print(vec![Expr::str("<"), var(C), var(D), Expr::str(">")]),
    ];
    assert_eq!(run(ops, SLOTS), "7\n<>\n");
}

#[test]
fn test_delay() {
    let ops = vec![Opcode::Delay(int(1)), print(vec![Expr::str("done")])];
    assert_eq!(run(ops, SLOTS), "done\n");
    let ops = vec![Opcode::Delay(int(60_000)), print(vec![Expr::str("late")])];
    let (mut r, out) = runtime_with(Program::from_ops(ops, SLOTS), Capture::break_after(3));
    assert_eq!(exec(&mut r, &out), "BREAK\n");
}

#[test]
fn test_read_and_restore() {
    let ops = vec![
        Opcode::Read(vec![Place::var(A), Place::var(B)]),
        Opcode::Read(vec![Place::var(C)]),
        print(vec![var(A), Expr::str(" "), var(B), Expr::str(" "), var(C)]),
        Opcode::Restore(1),
        Opcode::Read(vec![Place::var(D)]),
        print(vec![var(D)]),
        Opcode::Read(vec![Place::var(D), Place::var(M)]),
        print(vec![Expr::str("unreachable")]),
    ];
    let data = vec![Val::Int(1), Val::from("two"), Val::Real(3.5)];
    let (mut r, out) = runtime(Program::from_ops(ops, SLOTS).with_data(data));
    assert_eq!(exec(&mut r, &out), "1 two 3.5\ntwo\n?OUT OF DATA\n");
    assert_eq!(r.fetch(D).unwrap().to_string(), "3.5");
}

#[test]
fn test_read_into_constant() {
    let ops = vec![
        Opcode::Const {
            place: Place::var(A),
            expr: int(1),
        },
        Opcode::Read(vec![Place::var(A)]),
    ];
    let (mut r, out) = runtime(Program::from_ops(ops, SLOTS).with_data(vec![Val::Int(2)]));
    assert_eq!(exec(&mut r, &out), "?ASSIGNMENT TO CONSTANT\n");
}
