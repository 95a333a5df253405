pub mod scanner;
pub mod token;

pub use scanner::Lexer;
