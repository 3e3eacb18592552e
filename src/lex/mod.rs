//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente en
//! unidades léxicas denominadas tokens. El reconocimiento se delega a un
//! autómata finito determinista ([`dfa`]) que aplica la regla de
//! coincidencia más larga con retroceso.
//!
//! # Contenido de un token
//! Todo token preserva su lexema original y su posición. Los tokens de
//! literales resuelven además su valor en el momento de construirse, de
//! modo que las fases posteriores no vuelven a interpretar texto. Los
//! espacios en blanco y los comentarios sí se emiten como tokens; es el
//! parser quien los descarta.
//!
//! # Errores
//! El lexer se recupera de cualquier condición de error: una corrida de
//! caracteres no reconocida se reporta y el análisis continúa justo
//! después de ella. Esto permite reportar más de un error léxico por
//! ejecución, pero cualquier error impide avanzar a las demás fases.

use crate::{
    source::{Located, Position},
    types::Color,
};

use std::{
    fmt::{self, Display},
    io::{self, Write},
    str::FromStr,
};

use thiserror::Error;

pub mod dfa;

use dfa::{Dfa, DfaBuilder, Match};

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    /// Una corrida de caracteres que no forma ningún token.
    #[error("unrecognized lexeme `{0}`")]
    Unrecognized(String),

    /// Un nombre con prefijo `__` que no corresponde a ningún builtin.
    #[error("undefined builtin `{0}`")]
    UndefinedBuiltin(String),

    /// Una constante entera se encuentra fuera de rango.
    #[error("integer literal `{0}` does not fit in 64 bits")]
    IntOverflow(String),
}

/// Clasificación de un token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    OpenParen,
    CloseParen,
    OpenCurly,
    CloseCurly,
    OpenSquare,
    CloseSquare,
    Comma,
    Semicolon,
    Colon,
    Arrow,

    IntType,
    FloatType,
    BoolType,
    ColorType,

    Integer,
    Float,
    Bool,
    Color,
    Builtin,
    Identifier,

    Let,
    Fun,
    Return,
    If,
    Else,
    For,
    While,
    And,
    Or,
    Not,
    As,

    Comment,
    Whitespace,
    EndOfFile,
}

impl TokenKind {
    /// Nombre del tipo de token en volcados de depuración.
    pub fn name(self) -> &'static str {
        use TokenKind::*;

        match self {
            Plus => "PLUS",
            Minus => "MINUS",
            Star => "STAR",
            Slash => "SLASH",
            Assign => "ASSIGN",
            Equal => "EQUAL",
            NotEqual => "NOT_EQUAL",
            Less => "LESS",
            LessEqual => "LESS_EQUAL",
            Greater => "GREATER",
            GreaterEqual => "GREATER_EQUAL",
            OpenParen => "OPEN_PAREN",
            CloseParen => "CLOSE_PAREN",
            OpenCurly => "OPEN_CURLY",
            CloseCurly => "CLOSE_CURLY",
            OpenSquare => "OPEN_SQUARE",
            CloseSquare => "CLOSE_SQUARE",
            Comma => "COMMA",
            Semicolon => "SEMICOLON",
            Colon => "COLON",
            Arrow => "ARROW",
            IntType => "INT_TYPE",
            FloatType => "FLOAT_TYPE",
            BoolType => "BOOL_TYPE",
            ColorType => "COLOUR_TYPE",
            Integer => "INTEGER",
            Float => "FLOAT",
            Bool => "BOOL",
            Color => "COLOUR",
            Builtin => "BUILTIN",
            Identifier => "IDENTIFIER",
            Let => "LET",
            Fun => "FUN",
            Return => "RETURN",
            If => "IF",
            Else => "ELSE",
            For => "FOR",
            While => "WHILE",
            And => "AND",
            Or => "OR",
            Not => "NOT",
            As => "AS",
            Comment => "COMMENT",
            Whitespace => "WHITESPACE",
            EndOfFile => "END_OF_FILE",
        }
    }

    /// Tokens que no tienen relevancia sintáctica.
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Comment | TokenKind::Whitespace)
    }
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Palabras reservadas que el lexer reconoce inicialmente como identificadores.
const RESERVED: &[(&str, TokenKind)] = &[
    ("int",    TokenKind::IntType),
    ("float",  TokenKind::FloatType),
    ("bool",   TokenKind::BoolType),
    ("colour", TokenKind::ColorType),
    ("color",  TokenKind::ColorType),
    ("true",   TokenKind::Bool),
    ("false",  TokenKind::Bool),
    ("let",    TokenKind::Let),
    ("fun",    TokenKind::Fun),
    ("return", TokenKind::Return),
    ("if",     TokenKind::If),
    ("else",   TokenKind::Else),
    ("for",    TokenKind::For),
    ("while",  TokenKind::While),
    ("and",    TokenKind::And),
    ("or",     TokenKind::Or),
    ("not",    TokenKind::Not),
    ("as",     TokenKind::As),
];

/// Funciones y sentencias predefinidas.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Width,
    Height,
    Read,
    RandomInt,
    Print,
    Delay,
    Write,
    WriteBox,
    Clear,
}

impl Builtin {
    /// Determina si el builtin se usa como sentencia y no como expresión.
    pub fn is_statement(self) -> bool {
        use Builtin::*;
        matches!(self, Print | Delay | Write | WriteBox | Clear)
    }
}

impl Display for Builtin {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Builtin::*;

        let string = match self {
            Width     => "__width",
            Height    => "__height",
            Read      => "__read",
            RandomInt => "__random_int",
            Print     => "__print",
            Delay     => "__delay",
            Write     => "__write",
            WriteBox  => "__write_box",
            Clear     => "__clear",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Builtin {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Builtin::*;

        const BUILTINS: &[(&str, Builtin)] = &[
            ("__width",      Width),
            ("__height",     Height),
            ("__read",       Read),
            ("__random_int", RandomInt),
            ("__print",      Print),
            ("__delay",      Delay),
            ("__write",      Write),
            ("__write_box",  WriteBox),
            ("__clear",      Clear),
        ];

        BUILTINS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, builtin)| builtin)
            .ok_or(())
    }
}

/// Valor ya interpretado de un token literal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Color(Color),
    Builtin(Builtin),
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente. Es inmutable una vez
/// construido.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    position: Position,
    lexeme: String,
    kind: TokenKind,
    value: Option<Literal>,
}

impl Token {
    /// Construye un token, interpretando su valor literal si lo tiene.
    ///
    /// Un identificador cuyo lexema es una palabra reservada se
    /// reclasifica en este punto.
    pub fn new(kind: TokenKind, lexeme: String, position: Position) -> Result<Self, LexerError> {
        let kind = match kind {
            TokenKind::Identifier => RESERVED
                .iter()
                .find(|&&(word, _)| word == lexeme)
                .map_or(kind, |&(_, reserved)| reserved),

            _ => kind,
        };

        let value = match kind {
            TokenKind::Integer => match lexeme.parse() {
                Ok(integer) => Some(Literal::Int(integer)),
                Err(_) => return Err(LexerError::IntOverflow(lexeme)),
            },

            TokenKind::Float => match lexeme.parse() {
                Ok(float) => Some(Literal::Float(float)),
                Err(_) => return Err(LexerError::Unrecognized(lexeme)),
            },

            TokenKind::Color => match Color::parse(&lexeme) {
                Some(color) => Some(Literal::Color(color)),
                None => return Err(LexerError::Unrecognized(lexeme)),
            },

            TokenKind::Builtin => match Builtin::from_str(&lexeme) {
                Ok(builtin) => Some(Literal::Builtin(builtin)),
                Err(()) => return Err(LexerError::UndefinedBuiltin(lexeme)),
            },

            TokenKind::Bool => Some(Literal::Bool(lexeme == "true")),
            _ => None,
        };

        Ok(Token {
            position,
            lexeme,
            kind,
            value,
        })
    }

    /// Token de fin de archivo.
    pub fn eof(position: Position) -> Self {
        Token {
            position,
            lexeme: String::new(),
            kind: TokenKind::EndOfFile,
            value: None,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn value(&self) -> Option<Literal> {
        self.value
    }

    pub fn builtin(&self) -> Option<Builtin> {
        match self.value {
            Some(Literal::Builtin(builtin)) => Some(builtin),
            _ => None,
        }
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::EndOfFile => fmt.write_str("end of file"),
            _ => write!(fmt, "`{}`", self.lexeme),
        }
    }
}

/// Estados del autómata léxico.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum State {
    Start,
    Whitespace,
    Word,
    Underscore,
    DoubleUnderscore,
    Builtin,
    Integer,
    Point,
    Float,
    Hash,
    Hex(u8),
    Slash,
    LineComment,
    BlockComment,
    BlockStar,
    BlockEnd,
    Minus,
    Arrow,
    Assign,
    Equal,
    Bang,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Single(TokenKind),
}

/// Categorías de caracteres, en orden de consulta.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Class {
    Newline,
    Space,
    Underscore,
    Digit,
    Letter,
    Hex,
    Plus,
    Minus,
    Star,
    Slash,
    Equals,
    Bang,
    Less,
    Greater,
    OpenParen,
    CloseParen,
    OpenCurly,
    CloseCurly,
    OpenSquare,
    CloseSquare,
    Comma,
    Semicolon,
    Colon,
    Point,
    Hash,
    NotNewline,
    NotStar,
}

/// Construye el autómata del lenguaje.
fn automaton() -> Dfa<State, Class, TokenKind> {
    use Class as C;
    use State as S;

    const SINGLES: &[(Class, TokenKind)] = &[
        (C::Plus,        TokenKind::Plus),
        (C::Star,        TokenKind::Star),
        (C::OpenParen,   TokenKind::OpenParen),
        (C::CloseParen,  TokenKind::CloseParen),
        (C::OpenCurly,   TokenKind::OpenCurly),
        (C::CloseCurly,  TokenKind::CloseCurly),
        (C::OpenSquare,  TokenKind::OpenSquare),
        (C::CloseSquare, TokenKind::CloseSquare),
        (C::Comma,       TokenKind::Comma),
        (C::Semicolon,   TokenKind::Semicolon),
        (C::Colon,       TokenKind::Colon),
    ];

    let mut builder = DfaBuilder::new()
        .category(C::Newline, |c| c == '\n')
        .category(C::Space, |c| matches!(c, ' ' | '\t' | '\r'))
        .category(C::Underscore, |c| c == '_')
        .category(C::Digit, |c| c.is_ascii_digit())
        .category(C::Letter, |c| c.is_ascii_alphabetic())
        .category(C::Hex, |c| c.is_ascii_hexdigit())
        .category(C::Plus, |c| c == '+')
        .category(C::Minus, |c| c == '-')
        .category(C::Star, |c| c == '*')
        .category(C::Slash, |c| c == '/')
        .category(C::Equals, |c| c == '=')
        .category(C::Bang, |c| c == '!')
        .category(C::Less, |c| c == '<')
        .category(C::Greater, |c| c == '>')
        .category(C::OpenParen, |c| c == '(')
        .category(C::CloseParen, |c| c == ')')
        .category(C::OpenCurly, |c| c == '{')
        .category(C::CloseCurly, |c| c == '}')
        .category(C::OpenSquare, |c| c == '[')
        .category(C::CloseSquare, |c| c == ']')
        .category(C::Comma, |c| c == ',')
        .category(C::Semicolon, |c| c == ';')
        .category(C::Colon, |c| c == ':')
        .category(C::Point, |c| c == '.')
        .category(C::Hash, |c| c == '#')
        .category(C::NotNewline, |c| c != '\n')
        .category(C::NotStar, |c| c != '*')
        .initial(S::Start);

    // Espacios en blanco
    builder = builder
        .transitions(S::Start, &[C::Newline, C::Space], S::Whitespace)
        .transitions(S::Whitespace, &[C::Newline, C::Space], S::Whitespace)
        .accept(S::Whitespace, TokenKind::Whitespace);

    // Identificadores y builtins; `__` solo no es un token válido
    builder = builder
        .transition(S::Start, C::Letter, S::Word)
        .transitions(S::Word, &[C::Letter, C::Digit, C::Underscore], S::Word)
        .transition(S::Start, C::Underscore, S::Underscore)
        .transitions(S::Underscore, &[C::Letter, C::Digit], S::Word)
        .transition(S::Underscore, C::Underscore, S::DoubleUnderscore)
        .transitions(S::DoubleUnderscore, &[C::Letter, C::Digit, C::Underscore], S::Builtin)
        .transitions(S::Builtin, &[C::Letter, C::Digit, C::Underscore], S::Builtin)
        .accept(S::Word, TokenKind::Identifier)
        .accept(S::Underscore, TokenKind::Identifier)
        .accept(S::Builtin, TokenKind::Builtin);

    // Constantes numéricas
    builder = builder
        .transition(S::Start, C::Digit, S::Integer)
        .transition(S::Integer, C::Digit, S::Integer)
        .transition(S::Integer, C::Point, S::Point)
        .transition(S::Point, C::Digit, S::Float)
        .transition(S::Float, C::Digit, S::Float)
        .accept(S::Integer, TokenKind::Integer)
        .accept(S::Float, TokenKind::Float);

    // Colores: `#` seguido de exactamente seis dígitos hexadecimales
    builder = builder
        .transition(S::Start, C::Hash, S::Hash)
        .transition(S::Hash, C::Hex, S::Hex(1));

    for digit in 1..6 {
        builder = builder.transition(S::Hex(digit), C::Hex, S::Hex(digit + 1));
    }

    builder = builder.accept(S::Hex(6), TokenKind::Color);

    // División y comentarios
    builder = builder
        .transition(S::Start, C::Slash, S::Slash)
        .accept(S::Slash, TokenKind::Slash)
        .transition(S::Slash, C::Slash, S::LineComment)
        .transition(S::LineComment, C::NotNewline, S::LineComment)
        .accept(S::LineComment, TokenKind::Comment)
        .transition(S::Slash, C::Star, S::BlockComment)
        .transition(S::BlockComment, C::Star, S::BlockStar)
        .transition(S::BlockComment, C::NotStar, S::BlockComment)
        .transition(S::BlockStar, C::Star, S::BlockStar)
        .transition(S::BlockStar, C::Slash, S::BlockEnd)
        .transition(S::BlockStar, C::NotStar, S::BlockComment)
        .accept(S::BlockEnd, TokenKind::Comment);

    // Operadores de uno o dos caracteres
    builder = builder
        .transition(S::Start, C::Minus, S::Minus)
        .transition(S::Minus, C::Greater, S::Arrow)
        .transition(S::Start, C::Equals, S::Assign)
        .transition(S::Assign, C::Equals, S::Equal)
        .transition(S::Start, C::Bang, S::Bang)
        .transition(S::Bang, C::Equals, S::NotEqual)
        .transition(S::Start, C::Less, S::Less)
        .transition(S::Less, C::Equals, S::LessEqual)
        .transition(S::Start, C::Greater, S::Greater)
        .transition(S::Greater, C::Equals, S::GreaterEqual)
        .accept(S::Minus, TokenKind::Minus)
        .accept(S::Arrow, TokenKind::Arrow)
        .accept(S::Assign, TokenKind::Assign)
        .accept(S::Equal, TokenKind::Equal)
        .accept(S::NotEqual, TokenKind::NotEqual)
        .accept(S::Less, TokenKind::Less)
        .accept(S::LessEqual, TokenKind::LessEqual)
        .accept(S::Greater, TokenKind::Greater)
        .accept(S::GreaterEqual, TokenKind::GreaterEqual);

    for &(class, kind) in SINGLES {
        builder = builder
            .transition(S::Start, class, S::Single(kind))
            .accept(S::Single(kind), kind);
    }

    builder.build()
}

/// Escáner del texto fuente.
///
/// Emite tokens en orden, terminando siempre con exactamente un token
/// [`TokenKind::EndOfFile`].
pub struct Lexer {
    dfa: Dfa<State, Class, TokenKind>,
    input: Vec<char>,
    cursor: usize,
    position: Position,
    finished: bool,
}

impl Lexer {
    /// Crea un lexer en estado inicial a partir del texto fuente.
    pub fn new(source: &str) -> Self {
        Lexer {
            dfa: automaton(),
            input: source.chars().collect(),
            cursor: 0,
            position: Position::default(),
            finished: false,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de acumular tokens y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma ejecución
    /// del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Token>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Consume `length` caracteres y los retorna como lexema.
    fn take(&mut self, length: usize) -> String {
        let end = (self.cursor + length).min(self.input.len());
        let lexeme: String = self.input[self.cursor..end].iter().collect();

        for &c in &self.input[self.cursor..end] {
            self.position = self.position.after(c);
        }

        self.cursor = end;
        lexeme
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        } else if self.cursor >= self.input.len() {
            self.finished = true;
            return Some(Ok(Token::eof(self.position)));
        }

        let start = self.position;
        let result = match self.dfa.longest_match(&self.input[self.cursor..]) {
            Match::Accepted { kind, length } => {
                let lexeme = self.take(length);
                Token::new(kind, lexeme, start)
            }

            Match::Rejected { length } => Err(LexerError::Unrecognized(self.take(length))),
        };

        Some(result.map_err(|error| Located::at(error, start)))
    }
}

/// Volcado crudo de tokens, uno por línea: `fila:columna TIPO(lexema)`.
pub fn dump<W: Write>(tokens: &[Token], output: &mut W) -> io::Result<()> {
    for token in tokens {
        writeln!(
            output,
            "{} {}({})",
            token.position,
            token.kind,
            token.lexeme.escape_debug()
        )?;
    }

    Ok(())
}
