use super::{Address, Call, Expr, ModuleId, Place, SlotId};

/// ## Virtual machine instruction set
///
/// One instruction per statement. Construct openers carry the address
/// to continue at when their body is skipped; closers carry the address
/// of the opener they loop back to. Every address is a label until the
/// program is linked.
///
/// For example: `FOR I = 1 TO 3: PRINT I: NEXT` compiles to
/// `[For { var: I, head: To(1, 3), exit_ip: 3 }, Print(I), Next]`

#[derive(Clone)]
pub enum Opcode {
    // *** Data
    Let {
        place: Place,
        expr: Expr,
    },
    /// Assign and mark the cell read-only.
    Const {
        place: Place,
        expr: Expr,
    },
    Dim {
        place: Place,
        dims: Vec<Dim>,
        preserve: bool,
    },
    Append {
        place: Place,
        items: Vec<Expr>,
    },
    Insert {
        place: Place,
        index: Expr,
        items: Vec<Expr>,
    },
    Delete {
        place: Place,
        index: Expr,
        count: Option<Expr>,
    },
    Erase(Vec<Place>),
    Swap(Place, Place),
    /// Assign the next constants from the program's data pool.
    Read(Vec<Place>),
    /// Move the data pool cursor.
    Restore(usize),
    /// Order an array in place. `using` names a function of two values
    /// returning negative, zero or positive.
    Sort {
        place: Place,
        using: Option<Expr>,
    },
    /// Store the subscript of the first element equal to `key`, or one
    /// below the lower bound when there is none.
    Search {
        place: Place,
        key: Expr,
        result: Place,
        using: Option<Expr>,
    },
    /// Break `text` on any character of `delims` into an array of
    /// strings. Characters of `pairs` open and close spans that are not
    /// broken, such as `""()`. `using` maps each piece.
    Split {
        text: Expr,
        delims: Expr,
        pairs: Option<Expr>,
        place: Place,
        using: Option<Expr>,
    },
    Join {
        place: Place,
        delim: Expr,
        target: Place,
    },

    // *** Branch control
    Jump(Address),
    /// Computed jump through a 1-based selector.
    On {
        selector: Expr,
        targets: Vec<Address>,
        gosub: bool,
    },
    If {
        cond: Expr,
        false_ip: Address,
    },
    Elif {
        cond: Expr,
        false_ip: Address,
    },
    Else {
        end_ip: Address,
    },
    EndIf,
    For {
        var: Place,
        head: ForHead,
        exit_ip: Address,
    },
    Next,
    While {
        cond: Expr,
        exit_ip: Address,
    },
    Wend {
        loop_ip: Address,
    },
    Repeat {
        exit_ip: Address,
    },
    Until {
        cond: Expr,
        loop_ip: Address,
    },
    Gosub(Address),
    Return,
    Select(Expr),
    Case {
        candidates: Vec<Expr>,
        false_ip: Address,
    },
    CaseElse {
        false_ip: Address,
    },
    EndSelect,
    Try {
        catch_ip: Address,
    },
    /// Reached normally only when the try block finished; an error
    /// lands on the instruction after it.
    Catch {
        end_ip: Address,
        var: Option<Place>,
    },
    EndTry,
    Throw(Expr),
    Exit(ExitKind),
    End,

    // *** Procedures
    Call(Call),
    Plugin {
        module: ModuleId,
        index: usize,
        args: Vec<Expr>,
    },
    /// Callee prologue binding the pushed arguments.
    Param(Vec<ParamDecl>),
    Local(Vec<SlotId>),
    /// Leave a function from the middle of its body.
    FuncReturn(Address),
    /// Procedure and function epilogue.
    ProcReturn,

    // *** Statements
    Print {
        target: PrintTo,
        items: Vec<PrintItem>,
    },
    Input {
        source: InputFrom,
        prompt: Option<Expr>,
        places: Vec<Place>,
    },
    Delay(Expr),
}

#[derive(Debug, Clone)]
pub struct Dim {
    pub lower: Option<Expr>,
    pub upper: Expr,
}

#[derive(Debug, Clone)]
pub enum ForHead {
    To {
        from: Expr,
        to: Expr,
        step: Option<Expr>,
    },
    In(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitKind {
    Any,
    For,
    Loop,
    Proc,
    Func,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDecl {
    pub slot: SlotId,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub enum PrintTo {
    Console,
    File(Expr),
    Log,
    Net(Expr),
    Str(Place),
}

#[derive(Debug, Clone)]
pub enum InputFrom {
    Console,
    File(Expr),
    Str(Place),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sep {
    None,
    Semicolon,
    Comma,
}

#[derive(Debug, Clone)]
pub struct PrintItem {
    pub expr: Expr,
    pub sep: Sep,
}

impl Opcode {
    /// Visit every jump target, including those inside expressions.
    pub fn targets_mut(&mut self, f: &mut dyn FnMut(&mut Address)) {
        use Opcode::*;
        match self {
            Let { place, expr } | Const { place, expr } => {
                place.targets_mut(f);
                expr.targets_mut(f);
            }
            Dim { place, dims, .. } => {
                place.targets_mut(f);
                for dim in dims.iter_mut() {
                    if let Some(lower) = &mut dim.lower {
                        lower.targets_mut(f);
                    }
                    dim.upper.targets_mut(f);
                }
            }
            Append { place, items } => {
                place.targets_mut(f);
                exprs_mut(items, f);
            }
            Insert {
                place,
                index,
                items,
            } => {
                place.targets_mut(f);
                index.targets_mut(f);
                exprs_mut(items, f);
            }
            Delete {
                place,
                index,
                count,
            } => {
                place.targets_mut(f);
                index.targets_mut(f);
                if let Some(count) = count {
                    count.targets_mut(f);
                }
            }
            Erase(places) => {
                for place in places.iter_mut() {
                    place.targets_mut(f);
                }
            }
            Swap(a, b) => {
                a.targets_mut(f);
                b.targets_mut(f);
            }
            Read(places) => {
                for place in places.iter_mut() {
                    place.targets_mut(f);
                }
            }
            Sort { place, using } => {
                place.targets_mut(f);
                if let Some(using) = using {
                    using.targets_mut(f);
                }
            }
            Search {
                place,
                key,
                result,
                using,
            } => {
                place.targets_mut(f);
                key.targets_mut(f);
                result.targets_mut(f);
                if let Some(using) = using {
                    using.targets_mut(f);
                }
            }
            Split {
                text,
                delims,
                pairs,
                place,
                using,
            } => {
                text.targets_mut(f);
                delims.targets_mut(f);
                place.targets_mut(f);
                for expr in pairs.iter_mut().chain(using.iter_mut()) {
                    expr.targets_mut(f);
                }
            }
            Join {
                place,
                delim,
                target,
            } => {
                place.targets_mut(f);
                delim.targets_mut(f);
                target.targets_mut(f);
            }
            Jump(addr) | Gosub(addr) | FuncReturn(addr) => f(addr),
            On {
                selector, targets, ..
            } => {
                selector.targets_mut(f);
                for addr in targets.iter_mut() {
                    f(addr);
                }
            }
            If { cond, false_ip } | Elif { cond, false_ip } => {
                cond.targets_mut(f);
                f(false_ip);
            }
            Else { end_ip } => f(end_ip),
            For { var, head, exit_ip } => {
                var.targets_mut(f);
                match head {
                    ForHead::To { from, to, step } => {
                        from.targets_mut(f);
                        to.targets_mut(f);
                        if let Some(step) = step {
                            step.targets_mut(f);
                        }
                    }
                    ForHead::In(source) => source.targets_mut(f),
                }
                f(exit_ip);
            }
            While { cond, exit_ip } => {
                cond.targets_mut(f);
                f(exit_ip);
            }
            Wend { loop_ip } => f(loop_ip),
            Repeat { exit_ip } => f(exit_ip),
            Until { cond, loop_ip } => {
                cond.targets_mut(f);
                f(loop_ip);
            }
            Select(expr) | Throw(expr) | Delay(expr) => expr.targets_mut(f),
            Case {
                candidates,
                false_ip,
            } => {
                exprs_mut(candidates, f);
                f(false_ip);
            }
            CaseElse { false_ip } => f(false_ip),
            Try { catch_ip } => f(catch_ip),
            Catch { end_ip, var } => {
                f(end_ip);
                if let Some(var) = var {
                    var.targets_mut(f);
                }
            }
            Call(call) => call.targets_mut(f),
            Plugin { args, .. } => exprs_mut(args, f),
            Print { target, items } => {
                match target {
                    PrintTo::File(e) | PrintTo::Net(e) => e.targets_mut(f),
                    PrintTo::Str(place) => place.targets_mut(f),
                    PrintTo::Console | PrintTo::Log => {}
                }
                for item in items.iter_mut() {
                    item.expr.targets_mut(f);
                }
            }
            Input {
                source,
                prompt,
                places,
            } => {
                match source {
                    InputFrom::File(e) => e.targets_mut(f),
                    InputFrom::Str(place) => place.targets_mut(f),
                    InputFrom::Console => {}
                }
                if let Some(prompt) = prompt {
                    prompt.targets_mut(f);
                }
                for place in places.iter_mut() {
                    place.targets_mut(f);
                }
            }
            EndIf | Next | Return | EndSelect | EndTry | Exit(_) | End | Param(_) | Local(_)
            | ProcReturn | Restore(_) => {}
        }
    }
}

fn exprs_mut(exprs: &mut [Expr], f: &mut dyn FnMut(&mut Address)) {
    for expr in exprs.iter_mut() {
        expr.targets_mut(f);
    }
}

impl std::fmt::Debug for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Opcode::*;
        match self {
            Let { place, .. } => write!(f, "LET({})", place.slot),
            Const { place, .. } => write!(f, "CONST({})", place.slot),
            Dim { place, preserve, .. } => {
                if *preserve {
                    write!(f, "REDIM({})", place.slot)
                } else {
                    write!(f, "DIM({})", place.slot)
                }
            }
            Append { place, .. } => write!(f, "APPEND({})", place.slot),
            Insert { place, .. } => write!(f, "INSERT({})", place.slot),
            Delete { place, .. } => write!(f, "DELETE({})", place.slot),
            Erase(places) => write!(f, "ERASE({})", places.len()),
            Swap(a, b) => write!(f, "SWAP({},{})", a.slot, b.slot),
            Read(places) => write!(f, "READ({})", places.len()),
            Restore(pos) => write!(f, "RESTORE({})", pos),
            Sort { place, .. } => write!(f, "SORT({})", place.slot),
            Search { place, .. } => write!(f, "SEARCH({})", place.slot),
            Split { place, .. } => write!(f, "SPLIT({})", place.slot),
            Join { place, .. } => write!(f, "JOIN({})", place.slot),

            Jump(a) => write!(f, "JUMP({})", a),
            On { targets, gosub, .. } => {
                let kind = if *gosub { "GOSUB" } else { "GOTO" };
                write!(f, "ON{}({:?})", kind, targets)
            }
            If { false_ip, .. } => write!(f, "IF({})", false_ip),
            Elif { false_ip, .. } => write!(f, "ELIF({})", false_ip),
            Else { end_ip } => write!(f, "ELSE({})", end_ip),
            EndIf => write!(f, "ENDIF"),
            For { exit_ip, head, .. } => match head {
                ForHead::To { .. } => write!(f, "FOR({})", exit_ip),
                ForHead::In(_) => write!(f, "FORIN({})", exit_ip),
            },
            Next => write!(f, "NEXT"),
            While { exit_ip, .. } => write!(f, "WHILE({})", exit_ip),
            Wend { loop_ip } => write!(f, "WEND({})", loop_ip),
            Repeat { exit_ip } => write!(f, "REPEAT({})", exit_ip),
            Until { loop_ip, .. } => write!(f, "UNTIL({})", loop_ip),
            Gosub(a) => write!(f, "GOSUB({})", a),
            Return => write!(f, "RETURN"),
            Select(_) => write!(f, "SELECT"),
            Case { false_ip, .. } => write!(f, "CASE({})", false_ip),
            CaseElse { false_ip } => write!(f, "CASEELSE({})", false_ip),
            EndSelect => write!(f, "ENDSELECT"),
            Try { catch_ip } => write!(f, "TRY({})", catch_ip),
            Catch { end_ip, .. } => write!(f, "CATCH({})", end_ip),
            EndTry => write!(f, "ENDTRY"),
            Throw(_) => write!(f, "THROW"),
            Exit(kind) => write!(f, "EXIT({})", format!("{:?}", kind).to_ascii_uppercase()),
            End => write!(f, "END"),

            Call(_) => write!(f, "CALL"),
            Plugin { module, index, .. } => write!(f, "PLUGIN({},{})", module, index),
            Param(decls) => write!(f, "PARAM({})", decls.len()),
            Local(slots) => write!(f, "LOCAL({})", slots.len()),
            FuncReturn(a) => write!(f, "FUNCRETURN({})", a),
            ProcReturn => write!(f, "RET"),

            Print { .. } => write!(f, "PRINT"),
            Input { .. } => write!(f, "INPUT"),
            Delay(_) => write!(f, "DELAY"),
        }
    }
}
