//! Purpose: Closed enumeration of UAST role tags and their canonical names.
//! Exports: `Role`.
//! Role: Single source of truth for the wire code <-> name mapping.
//! Invariants: Wire codes are stable and contiguous from zero.
//! Invariants: Every role renders as its canonical name; unknown codes decode as `Invalid`.

macro_rules! roles {
    ($($variant:ident = $code:literal),+ $(,)?) => {
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum Role {
            $($variant = $code),+
        }

        impl Role {
            pub const ALL: &'static [Role] = &[$(Role::$variant),+];

            pub fn from_code(code: i32) -> Role {
                match code {
                    $($code => Role::$variant,)+
                    _ => Role::Invalid,
                }
            }

            pub fn code(self) -> i32 {
                self as i32
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Role::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

roles! {
    Invalid = 0,
    Identifier = 1,
    Qualified = 2,
    Operator = 3,
    Binary = 4,
    Unary = 5,
    Left = 6,
    Right = 7,
    Infix = 8,
    Postfix = 9,
    Bitwise = 10,
    Boolean = 11,
    Unsigned = 12,
    LeftShift = 13,
    RightShift = 14,
    Or = 15,
    Xor = 16,
    And = 17,
    Expression = 18,
    Statement = 19,
    Equal = 20,
    Not = 21,
    LessThan = 22,
    LessThanOrEqual = 23,
    GreaterThan = 24,
    GreaterThanOrEqual = 25,
    Identical = 26,
    Contains = 27,
    Increment = 28,
    Decrement = 29,
    Negative = 30,
    Positive = 31,
    Dereference = 32,
    TakeAddress = 33,
    File = 34,
    Add = 35,
    Substract = 36,
    Multiply = 37,
    Divide = 38,
    Modulo = 39,
    Package = 40,
    Declaration = 41,
    Import = 42,
    Pathname = 43,
    Alias = 44,
    Function = 45,
    Body = 46,
    Name = 47,
    Receiver = 48,
    Argument = 49,
    Value = 50,
    ArgsList = 51,
    Base = 52,
    Implements = 53,
    Instance = 54,
    Subtype = 55,
    Subpackage = 56,
    Module = 57,
    Friend = 58,
    World = 59,
    If = 60,
    Condition = 61,
    Then = 62,
    Else = 63,
    Switch = 64,
    Case = 65,
    Default = 66,
    For = 67,
    Initialization = 68,
    Update = 69,
    Iterator = 70,
    While = 71,
    DoWhile = 72,
    Break = 73,
    Continue = 74,
    Goto = 75,
    Block = 76,
    Scope = 77,
    Return = 78,
    Try = 79,
    Catch = 80,
    Finally = 81,
    Throw = 82,
    Assert = 83,
    Call = 84,
    Callee = 85,
    Positional = 86,
    Noop = 87,
    Literal = 88,
    Byte = 89,
    ByteString = 90,
    Character = 91,
    List = 92,
    Map = 93,
    Null = 94,
    Number = 95,
    Regexp = 96,
    Set = 97,
    String = 98,
    Tuple = 99,
    Type = 100,
    Entry = 101,
    Key = 102,
    Primitive = 103,
    Assignment = 104,
    This = 105,
    Comment = 106,
    Documentation = 107,
    Whitespace = 108,
    Incomplete = 109,
    Unannotated = 110,
    Visibility = 111,
    Annotation = 112,
    Anonymous = 113,
    Enumeration = 114,
    Arithmetic = 115,
    Relational = 116,
    Variable = 117,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
