use super::LineNumber;

#[derive(Clone, PartialEq)]
pub struct Error {
    code: u16,
    line_number: LineNumber,
    message: String,
}

#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($err:ident) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
    };
    ($err:ident, $line:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).in_line_number($line)
    };
    ($err:ident; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).message($msg)
    };
    ($err:ident, $line:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line_number($line)
            .message($msg)
    };
}

impl Error {
    pub fn new(code: ErrorCode) -> Error {
        Error {
            code: code as u16,
            line_number: None,
            message: String::new(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn line_number(&self) -> LineNumber {
        self.line_number
    }

    pub fn text(&self) -> &str {
        &self.message
    }

    /// Errors travel up through nested calls; only the innermost
    /// line number is kept.
    pub fn in_line_number(&self, line: LineNumber) -> Error {
        Error {
            code: self.code,
            line_number: self.line_number.or(line),
            message: self.message.clone(),
        }
    }

    pub fn message(&self, message: &str) -> Error {
        debug_assert_eq!(self.message.len(), 0);
        Error {
            code: self.code,
            line_number: self.line_number,
            message: message.to_string(),
        }
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code as u16
    }

    /// Fatal errors bypass every Try frame and abort the program.
    /// These are stack defects from the bytecode producer, plus the
    /// user break which must always unwind to the top.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.code,
            1 | 3 | 8 | 30 | 31 | 32 | 33 | 34 | 35 | 51 | 70 | 71
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorCode {
    NextWithoutFor = 1,
    ReturnWithoutGosub = 3,
    OutOfData = 4,
    IllegalFunctionCall = 5,
    Overflow = 6,
    OutOfMemory = 7,
    UndefinedLine = 8,
    SubscriptOutOfRange = 9,
    RedimensionedArray = 10,
    DivisionByZero = 11,
    TypeMismatch = 13,
    UndefinedUserFunction = 18,
    WendWithoutWhile = 30,
    UntilWithoutRepeat = 31,
    EndIfWithoutIf = 32,
    CaseWithoutSelect = 33,
    ExitWithoutBlock = 34,
    CatchWithoutTry = 35,
    InternalError = 51,
    BadFileNumber = 52,
    FileNotFound = 53,
    Break = 70,
    Halt = 71,
    ArgumentCount = 80,
    ByRefRequired = 81,
    ConstantAssignment = 82,
    CircularReference = 83,
    ModuleError = 84,
    UserError = 85,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {{ {} }}", self.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let code_str = match self.code {
            1 => "NEXT WITHOUT FOR",
            3 => "RETURN WITHOUT GOSUB",
            4 => "OUT OF DATA",
            5 => "ILLEGAL FUNCTION CALL",
            6 => "OVERFLOW",
            7 => "OUT OF MEMORY",
            8 => "UNDEFINED LINE",
            9 => "SUBSCRIPT OUT OF RANGE",
            10 => "DIMENSION MISMATCH",
            11 => "DIVISION BY ZERO",
            13 => "TYPE MISMATCH",
            18 => "UNDEFINED USER FUNCTION",
            30 => "WEND WITHOUT WHILE",
            31 => "UNTIL WITHOUT REPEAT",
            32 => "END IF WITHOUT IF",
            33 => "CASE WITHOUT SELECT",
            34 => "EXIT WITHOUT BLOCK",
            35 => "CATCH WITHOUT TRY",
            51 => "INTERNAL ERROR",
            52 => "BAD FILE NUMBER",
            53 => "FILE NOT FOUND",
            70 => "BREAK",
            71 => "END",
            80 => "ARGUMENT COUNT MISMATCH",
            81 => "BY REFERENCE ARGUMENT REQUIRED",
            82 => "ASSIGNMENT TO CONSTANT",
            83 => "CIRCULAR REFERENCE",
            84 => "MODULE ERROR",
            85 => "",
            _ => "",
        };
        if self.code == ErrorCode::UserError as u16 {
            return match self.line_number {
                Some(line) => write!(f, "{} IN {}", self.message, line),
                None => write!(f, "{}", self.message),
            };
        }
        let mut suffix = String::new();
        if let Some(line_number) = self.line_number {
            suffix.push_str(&format!(" {}", line_number));
        }
        if !self.message.is_empty() {
            suffix.push_str(&format!("; {}", self.message));
        }
        if code_str.is_empty() {
            if suffix.is_empty() {
                write!(f, "PROGRAM ERROR {}", self.code)
            } else {
                write!(f, "PROGRAM ERROR {} IN{}", self.code, suffix)
            }
        } else if suffix.is_empty() {
            write!(f, "{}", code_str)
        } else if self.line_number.is_some() {
            write!(f, "{} IN{}", code_str, suffix)
        } else {
            write!(f, "{}{}", code_str, suffix)
        }
    }
}
