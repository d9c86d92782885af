//! The token and AST node types the scanner, parser, resolver, and
//! evaluator all share.

pub mod expr;
pub mod stmt;
pub mod token;

pub use expr::{Expr, ExprKind, LogicalOp, NodeId, Value as LiteralValue};
pub use stmt::{ClassDecl, FunctionDecl, Stmt};
pub use token::{Literal, Token, TokenKind};
