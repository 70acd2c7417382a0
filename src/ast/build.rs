//! Convenience constructors for building typed trees by hand.
//!
//! Composite nodes derive their result type from their operands the way the type checker
//! would, which keeps hand-written trees in tests and tools short.

use super::*;

fn node(kind: ExprKind, ty: Type) -> Expr {
    Expr { kind, ty, line: 0 }
}

impl Expr {
    /// Set the source line reported by runtime checks.
    pub fn at(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

pub fn int(value: i64) -> Expr {
    node(ExprKind::IntLiteral { value }, Type::Int)
}

pub fn boolean(value: bool) -> Expr {
    node(ExprKind::BoolLiteral { value }, Type::Boolean)
}

pub fn string(value: &str) -> Expr {
    node(
        ExprKind::StringLiteral {
            value: value.to_string(),
        },
        Type::String,
    )
}

pub fn this(class: &str) -> Expr {
    node(ExprKind::This, Type::Class(class.to_string()))
}

pub fn ident(name: &str, ty: Type) -> Expr {
    node(
        ExprKind::Identifier {
            name: name.to_string(),
        },
        ty,
    )
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let ty = if op.is_comparison() || op.is_logical() {
        Type::Boolean
    } else if op == BinaryOp::Add && (lhs.ty == Type::String || rhs.ty == Type::String) {
        Type::String
    } else {
        lhs.ty.clone()
    };
    node(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    let ty = operand.ty.clone();
    node(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        ty,
    )
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn call(receiver: Expr, method: &str, args: Vec<Expr>, ret: Type) -> Expr {
    node(
        ExprKind::Call {
            receiver: Box::new(receiver),
            method: method.to_string(),
            args,
        },
        ret,
    )
}

pub fn new_object(class: &str) -> Expr {
    node(
        ExprKind::NewObject {
            class: class.to_string(),
        },
        Type::Class(class.to_string()),
    )
}

pub fn new_array(element: Type, dims: Vec<Expr>) -> Expr {
    let ty = dims
        .iter()
        .fold(element.clone(), |ty, _| Type::array_of(ty));
    node(ExprKind::NewArray { element, dims }, ty)
}

pub fn array_lookup(array: Expr, index: Expr) -> Expr {
    let ty = match &array.ty {
        Type::Array(element) => (**element).clone(),
        other => other.clone(),
    };
    node(
        ExprKind::ArrayLookup {
            array: Box::new(array),
            index: Box::new(index),
        },
        ty,
    )
}

pub fn array_length(array: Expr) -> Expr {
    node(
        ExprKind::ArrayLength {
            array: Box::new(array),
        },
        Type::Int,
    )
}

pub fn field(object: Expr, name: &str, ty: Type) -> Expr {
    node(
        ExprKind::Field {
            object: Box::new(object),
            name: name.to_string(),
        },
        ty,
    )
}

pub fn ternary(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    let ty = then.ty.clone();
    node(
        ExprKind::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        ty,
    )
}

pub fn instance_of(object: Expr, class: &str) -> Expr {
    node(
        ExprKind::InstanceOf {
            object: Box::new(object),
            class: class.to_string(),
        },
        Type::Boolean,
    )
}

pub fn increment(op: IncrementOp, target: Expr) -> Expr {
    let ty = target.ty.clone();
    node(
        ExprKind::Increment {
            op,
            target: Box::new(target),
        },
        ty,
    )
}

pub fn print(value: Expr) -> Statement {
    Statement::Print { value }
}

pub fn assign(target: Expr, value: Expr) -> Statement {
    compound(target, AssignOp::Assign, value)
}

pub fn compound(target: Expr, op: AssignOp, value: Expr) -> Statement {
    Statement::Assign { target, op, value }
}

pub fn ret(value: Expr) -> Statement {
    Statement::Return { value: Some(value) }
}

pub fn block(body: Vec<Statement>) -> Statement {
    Statement::Block { body }
}

pub fn if_else(cond: Expr, then: Statement, otherwise: Option<Statement>) -> Statement {
    Statement::If {
        cond,
        then: Box::new(then),
        otherwise: otherwise.map(Box::new),
    }
}

pub fn while_loop(cond: Expr, body: Statement) -> Statement {
    Statement::While {
        cond,
        body: Box::new(body),
    }
}

pub fn var_init(name: &str, ty: Type, init: Expr) -> Statement {
    Statement::VarInit {
        name: name.to_string(),
        ty,
        init,
    }
}

pub fn expr_stmt(expr: Expr) -> Statement {
    Statement::Expr { expr }
}

pub fn decl(name: &str, ty: Type) -> VarDecl {
    VarDecl {
        name: name.to_string(),
        ty,
    }
}

pub fn method(
    name: &str,
    return_type: Type,
    params: Vec<VarDecl>,
    locals: Vec<VarDecl>,
    body: Vec<Statement>,
) -> MethodDecl {
    MethodDecl {
        name: name.to_string(),
        return_type,
        params,
        locals,
        body,
    }
}

pub fn class(
    name: &str,
    parent: Option<&str>,
    fields: Vec<VarDecl>,
    methods: Vec<MethodDecl>,
) -> ClassDecl {
    ClassDecl {
        name: name.to_string(),
        parent: parent.map(str::to_string),
        fields,
        methods,
    }
}

/// A program whose main class is `Main` with the given locals and body.
pub fn program(locals: Vec<VarDecl>, body: Vec<Statement>, classes: Vec<ClassDecl>) -> Program {
    Program {
        main: MainClass {
            name: "Main".to_string(),
            args_name: "args".to_string(),
            locals,
            body,
        },
        classes,
    }
}
