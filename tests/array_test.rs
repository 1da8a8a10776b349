mod common;
use basic::mach::*;
use common::*;

const A: SlotId = 0;
const B: SlotId = 1;
const R: SlotId = 2;
const X: SlotId = 3;
const Y: SlotId = 4;
const F: SlotId = 5;
const SLOTS: usize = 8;

fn array(items: Vec<Expr>) -> Expr {
    Expr::Array(items)
}

fn func_ptr(target: Address) -> Option<Expr> {
    Some(Expr::FuncPtr {
        target,
        ret_slot: Some(F),
    })
}

fn sort(slot: SlotId, using: Option<Expr>) -> Opcode {
    Opcode::Sort {
        place: Place::var(slot),
        using,
    }
}

fn search(slot: SlotId, key: Expr, using: Option<Expr>) -> Opcode {
    Opcode::Search {
        place: Place::var(slot),
        key,
        result: Place::var(R),
        using,
    }
}

fn split(text: &str, delims: &str, pairs: Option<&str>, using: Option<Expr>) -> Opcode {
    Opcode::Split {
        text: Expr::str(text),
        delims: Expr::str(delims),
        pairs: pairs.map(Expr::str),
        place: Place::var(A),
        using,
    }
}

#[test]
fn test_sort() {
    let ops = vec![
        set(A, array(vec![int(3), int(1), int(2)])),
        sort(A, None),
        print(vec![var(A)]),
        set(
            B,
            array(vec![Expr::str("pear"), Expr::str("apple"), Expr::str("fig")]),
        ),
        sort(B, None),
        print(vec![var(B)]),
        set(X, int(5)),
        sort(X, None),
        print(vec![var(X)]),
    ];
    assert_eq!(
        run(ops, SLOTS),
        "[1,2,3]\n[\"apple\",\"fig\",\"pear\"]\n5\n"
    );
}

#[test]
fn test_sort_using_function() {
    let ops = vec![
        set(A, array(vec![int(1), int(3), int(2)])),
        sort(A, func_ptr(4)),
        print(vec![var(A)]),
        Opcode::End,
        params(&[(X, false), (Y, false)]),
        set(F, bin(Op::Sub, var(Y), var(X))),
        Opcode::ProcReturn,
    ];
    assert_eq!(run(ops, SLOTS), "[3,2,1]\n");
    let ops = vec![
        set(A, array(vec![int(1), int(3)])),
        sort(A, Some(int(1))),
    ];
    assert_eq!(run(ops, SLOTS), "?TYPE MISMATCH; USE NEEDS A FUNCTION\n");
}

#[test]
fn test_search() {
    let ops = vec![
        Opcode::Dim {
            place: Place::var(A),
            dims: vec![Dim {
                lower: Some(int(1)),
                upper: int(3),
            }],
            preserve: false,
        },
        Opcode::Let {
            place: Place::var(A).index(vec![int(2)]),
            expr: int(7),
        },
        search(A, int(7), None),
        print_inline(var(R)),
        search(A, int(4), None),
        print_inline(var(R)),
        set(X, int(5)),
        search(X, int(5), None),
        print(vec![var(R)]),
    ];
    assert_eq!(run(ops, SLOTS), "20-1\n");
}

#[test]
fn test_search_using_function() {
    let ops = vec![
        set(A, array(vec![int(15), int(23), int(31)])),
        search(A, int(3), func_ptr(4)),
        print(vec![var(R)]),
        Opcode::End,
        params(&[(X, false), (Y, false)]),
        set(F, bin(Op::Sub, bin(Op::Mod, var(X), int(10)), var(Y))),
        Opcode::ProcReturn,
    ];
    assert_eq!(run(ops, SLOTS), "1\n");
}

#[test]
fn test_split_and_join() {
    let ops = vec![
        split("a, b;c", ",;", None, None),
        print(vec![var(A)]),
        Opcode::Join {
            place: Place::var(A),
            delim: Expr::str("|"),
            target: Place::var(B),
        },
        print(vec![var(B)]),
        split("x=(1,2),y", ",", Some("()"), None),
        print(vec![var(A)]),
        split("", ",", None, None),
        print(vec![var(A)]),
        set(X, int(5)),
        Opcode::Join {
            place: Place::var(X),
            delim: Expr::str(","),
            target: Place::var(B),
        },
    ];
    assert_eq!(
        run(ops, SLOTS),
        "[\"a\",\" b\",\"c\"]\na| b|c\n[\"x=(1,2)\",\"y\"]\n[\"\"]\n\
         ?TYPE MISMATCH; JOIN NEEDS AN ARRAY, NOT INTEGER\n"
    );
}

#[test]
fn test_split_using_function() {
    let ops = vec![
        split("a,b", ",", None, func_ptr(3)),
        print(vec![var(A)]),
        Opcode::End,
        params(&[(X, false)]),
        set(F, bin(Op::Add, var(X), Expr::str("!"))),
        Opcode::ProcReturn,
    ];
    assert_eq!(run(ops, SLOTS), "[\"a!\",\"b!\"]\n");
}

#[test]
fn test_join_numbers() {
    let ops = vec![
        set(A, array(vec![int(1), Expr::real(2.5), Expr::str("x")])),
        Opcode::Join {
            place: Place::var(A),
            delim: Expr::str(", "),
            target: Place::var(B),
        },
        print(vec![var(B)]),
    ];
    assert_eq!(run(ops, SLOTS), "1, 2.5, x\n");
}
