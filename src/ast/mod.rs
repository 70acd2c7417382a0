// This module defines the typed syntax tree the backend consumes. Semantic analysis runs
// before code generation and is not part of this crate; what arrives here is a closed
// tree of sum types in which every expression node already carries its checked type and
// source line, every identifier is known to resolve, and the class hierarchy is acyclic.
// Each grammar category (types, expressions, statements) is one enum, so the selector's
// exhaustive matches are checked by the compiler. Declarations without an initializer only
// occur in the field, parameter and local lists and never as statements. Every type derives
// serde's Serialize/Deserialize so a front end running in another process can hand the
// tree over as JSON; the tagging scheme (`node` for expressions, `stmt` for statements,
// snake_case names) is the interchange format the command-line driver reads.

//! Typed syntax tree handed over by semantic analysis.

pub mod build;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Checked type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Int,
    Boolean,
    String,
    Void,
    Class(String),
    Array(Box<Type>),
}

impl Type {
    /// Name of the class for class-typed values.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Boolean => f.write_str("boolean"),
            Type::String => f.write_str("String"),
            Type::Void => f.write_str("void"),
            Type::Class(name) => f.write_str(name),
            Type::Array(element) => write!(f, "{element}[]"),
        }
    }
}

/// A whole compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub main: MainClass,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
}

/// The class holding the static entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainClass {
    pub name: String,
    #[serde(default = "default_args_name")]
    pub args_name: String,
    #[serde(default)]
    pub locals: Vec<VarDecl>,
    pub body: Vec<Statement>,
}

fn default_args_name() -> String {
    "args".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: Vec<VarDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub return_type: Type,
    #[serde(default)]
    pub params: Vec<VarDecl>,
    #[serde(default)]
    pub locals: Vec<VarDecl>,
    pub body: Vec<Statement>,
}

/// A declaration without initializer: field, parameter or method-level local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
}

/// Binary operators. `And`/`Or` short-circuit; the bitwise forms do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    /// Arithmetic `>>`.
    Shr,
    /// Logical `>>>`.
    UShr,
    And,
    Or,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Logical `!`.
    Not,
    Neg,
    Plus,
    /// Bitwise `~`.
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

/// Assignment operator: plain `=` or a compound form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    #[default]
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

/// An expression with its checked type and source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ExprKind {
    IntLiteral {
        value: i64,
    },
    BoolLiteral {
        value: bool,
    },
    StringLiteral {
        value: String,
    },
    This,
    Identifier {
        name: String,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    ArrayLookup {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLength {
        array: Box<Expr>,
    },
    Field {
        object: Box<Expr>,
        name: String,
    },
    Call {
        receiver: Box<Expr>,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    NewObject {
        class: String,
    },
    /// `new T[d0][d1]...`; one dimension expression per level.
    NewArray {
        element: Type,
        dims: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    InstanceOf {
        object: Box<Expr>,
        class: String,
    },
    Increment {
        op: IncrementOp,
        target: Box<Expr>,
    },
}

impl ExprKind {
    /// Short node name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::IntLiteral { .. } => "int literal",
            ExprKind::BoolLiteral { .. } => "boolean literal",
            ExprKind::StringLiteral { .. } => "string literal",
            ExprKind::This => "this",
            ExprKind::Identifier { .. } => "identifier",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::ArrayLookup { .. } => "array lookup",
            ExprKind::ArrayLength { .. } => "array length",
            ExprKind::Field { .. } => "field access",
            ExprKind::Call { .. } => "method call",
            ExprKind::NewObject { .. } => "object allocation",
            ExprKind::NewArray { .. } => "array allocation",
            ExprKind::Ternary { .. } => "conditional expression",
            ExprKind::InstanceOf { .. } => "instanceof",
            ExprKind::Increment { .. } => "increment",
        }
    }
}

/// `case` label of a switch arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseLabel {
    Value(i64),
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub label: CaseLabel,
    #[serde(default)]
    pub body: Vec<Statement>,
    /// Whether the arm ends in `break`; otherwise control falls into the next arm.
    #[serde(default)]
    pub breaks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Statement {
    Block {
        body: Vec<Statement>,
    },
    /// Block-scoped declaration with initializer.
    VarInit {
        name: String,
        ty: Type,
        init: Expr,
    },
    If {
        cond: Expr,
        then: Box<Statement>,
        #[serde(default)]
        otherwise: Option<Box<Statement>>,
    },
    While {
        cond: Expr,
        body: Box<Statement>,
    },
    For {
        #[serde(default)]
        init: Option<Box<Statement>>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Option<Box<Statement>>,
        body: Box<Statement>,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
    },
    Print {
        value: Expr,
    },
    Assign {
        target: Expr,
        #[serde(default)]
        op: AssignOp,
        value: Expr,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    /// Expression evaluated for its side effects.
    Expr {
        expr: Expr,
    },
}

impl Statement {
    /// Number of block-scoped declarations in this statement and everything nested in it.
    pub fn block_local_count(&self) -> usize {
        match self {
            Statement::VarInit { .. } => 1,
            Statement::Block { body } => body.iter().map(Statement::block_local_count).sum(),
            Statement::If {
                then, otherwise, ..
            } => {
                then.block_local_count()
                    + otherwise.as_ref().map_or(0, |s| s.block_local_count())
            }
            Statement::While { body, .. } => body.block_local_count(),
            Statement::For {
                init, update, body, ..
            } => {
                init.as_ref().map_or(0, |s| s.block_local_count())
                    + update.as_ref().map_or(0, |s| s.block_local_count())
                    + body.block_local_count()
            }
            Statement::Switch { cases, .. } => cases
                .iter()
                .flat_map(|c| c.body.iter())
                .map(Statement::block_local_count)
                .sum(),
            Statement::Print { .. }
            | Statement::Assign { .. }
            | Statement::Return { .. }
            | Statement::Expr { .. } => 0,
        }
    }
}
