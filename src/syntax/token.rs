/// All token kinds the scanner produces.
///
/// Tokens carry no text. The scanner reports where a token starts and how long
/// it is, and the evaluator slices the code region when it needs the text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    #[default]
    Err,
    Eof,

    // Variable length tokens
    Identifier,
    Number,
    String,

    // Punctuation
    Semicolon,
    Comma,
    Colon,
    Question,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Dot,

    // Keywords, implemented
    Break,
    Continue,
    Else,
    False,
    For,
    Function,
    If,
    Let,
    Null,
    Return,
    True,
    Typeof,
    Undefined,

    // Keywords, reserved only
    Case,
    Catch,
    Class,
    Const,
    Default,
    Delete,
    Do,
    Finally,
    In,
    Instanceof,
    New,
    Switch,
    This,
    Throw,
    Try,
    Var,
    Void,
    While,
    With,
    Yield,

    // Operators
    Call,   // synthetic, never scanned
    UPlus,  // synthetic unary +
    UMinus, // synthetic unary -
    PostInc,
    PostDec,
    Not,
    Tilde,
    Exp,
    Mul,
    Div,
    Rem,
    Plus,
    Minus,
    Shl,
    Shr,
    Zshr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Xor,
    Or,
    LAnd,
    LOr,

    // Assignment operators
    Assign,
    PlusAssign,
    MinusAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    ShlAssign,
    ShrAssign,
    ZshrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
}

static KEYWORDS: &[(&str, Token)] = &[
    ("break", Token::Break),
    ("case", Token::Case),
    ("catch", Token::Catch),
    ("class", Token::Class),
    ("const", Token::Const),
    ("continue", Token::Continue),
    ("default", Token::Default),
    ("delete", Token::Delete),
    ("do", Token::Do),
    ("else", Token::Else),
    ("false", Token::False),
    ("finally", Token::Finally),
    ("for", Token::For),
    ("function", Token::Function),
    ("if", Token::If),
    ("in", Token::In),
    ("instanceof", Token::Instanceof),
    ("let", Token::Let),
    ("new", Token::New),
    ("null", Token::Null),
    ("return", Token::Return),
    ("switch", Token::Switch),
    ("this", Token::This),
    ("throw", Token::Throw),
    ("true", Token::True),
    ("try", Token::Try),
    ("typeof", Token::Typeof),
    ("undefined", Token::Undefined),
    ("var", Token::Var),
    ("void", Token::Void),
    ("while", Token::While),
    ("with", Token::With),
    ("yield", Token::Yield),
];

impl Token {
    /// Keyword for `ident`, or [`Token::Identifier`].
    pub fn keyword(ident: &[u8]) -> Token {
        KEYWORDS
            .iter()
            .find(|(kw, _)| kw.as_bytes() == ident)
            .map_or(Token::Identifier, |&(_, tok)| tok)
    }

    /// Keywords the grammar reserves without giving them meaning.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            Token::Case
                | Token::Catch
                | Token::Class
                | Token::Const
                | Token::Default
                | Token::Delete
                | Token::Do
                | Token::Finally
                | Token::In
                | Token::Instanceof
                | Token::New
                | Token::Switch
                | Token::This
                | Token::Throw
                | Token::Try
                | Token::Var
                | Token::Void
                | Token::While
                | Token::With
                | Token::Yield
        )
    }

    #[inline]
    pub fn is_assign(self) -> bool {
        self.assign_base().is_some() || self == Token::Assign
    }

    /// Operators taking their single operand on the right.
    #[inline]
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Token::PostInc
                | Token::PostDec
                | Token::Not
                | Token::Tilde
                | Token::Typeof
                | Token::UPlus
                | Token::UMinus
        )
    }

    /// The binary operator a compound assignment applies.
    pub fn assign_base(self) -> Option<Token> {
        Some(match self {
            Token::PlusAssign => Token::Plus,
            Token::MinusAssign => Token::Minus,
            Token::MulAssign => Token::Mul,
            Token::DivAssign => Token::Div,
            Token::RemAssign => Token::Rem,
            Token::ShlAssign => Token::Shl,
            Token::ShrAssign => Token::Shr,
            Token::ZshrAssign => Token::Zshr,
            Token::AndAssign => Token::And,
            Token::XorAssign => Token::Xor,
            Token::OrAssign => Token::Or,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some((kw, _)) = KEYWORDS.iter().find(|(_, tok)| tok == self) {
            return f.write_str(kw);
        }
        let s = match self {
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Question => "?",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Dot => ".",
            Token::PostInc => "++",
            Token::PostDec => "--",
            Token::Not => "!",
            Token::Tilde => "~",
            Token::Exp => "**",
            Token::Mul => "*",
            Token::Div => "/",
            Token::Rem => "%",
            Token::Plus | Token::UPlus => "+",
            Token::Minus | Token::UMinus => "-",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::Zshr => ">>>",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Eq => "===",
            Token::Ne => "!==",
            Token::And => "&",
            Token::Xor => "^",
            Token::Or => "|",
            Token::LAnd => "&&",
            Token::LOr => "||",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::MulAssign => "*=",
            Token::DivAssign => "/=",
            Token::RemAssign => "%=",
            Token::ShlAssign => "<<=",
            Token::ShrAssign => ">>=",
            Token::ZshrAssign => ">>>=",
            Token::AndAssign => "&=",
            Token::XorAssign => "^=",
            Token::OrAssign => "|=",
            _ => return write!(f, "{self:?}"),
        };
        f.write_str(s)
    }
}
