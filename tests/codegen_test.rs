//! FileCheck tests on the assembly generated for small programs.

mod common;

use common::{arm64, check, compile, x86};
use minijc::ast::build::*;
use minijc::ast::{BinaryOp, CaseLabel, Program, Statement, SwitchCase, Type, UnaryOp};
use minijc::{compile_program, Arch, CodegenOptions, CompileError};
use std::collections::HashSet;

fn class_a() -> Type {
    Type::Class("A".into())
}

/// `class A { int f() { return 1 + 2 * 3; } }`, printed from main.
fn precedence_program() -> Program {
    let seven = binary(
        BinaryOp::Add,
        int(1),
        binary(BinaryOp::Mul, int(2), int(3)),
    );
    program(
        vec![],
        vec![print(call(new_object("A"), "f", vec![], Type::Int))],
        vec![class(
            "A",
            None,
            vec![],
            vec![method("f", Type::Int, vec![], vec![], vec![ret(seven)])],
        )],
    )
}

#[test]
fn test_accumulator_stack_discipline() {
    let asm = x86(&precedence_program());
    check(
        &asm,
        "CHECK-LABEL: method.A.f:
         CHECK-NEXT: pushq %rbp
         CHECK-NEXT: movq %rsp, %rbp
         CHECK-NEXT: subq $16, %rsp
         CHECK-NEXT: movq %rdi, -8(%rbp)
         CHECK-NEXT: movq $1, %rax
         CHECK-NEXT: pushq %rax
         CHECK-NEXT: movq $2, %rax
         CHECK-NEXT: pushq %rax
         CHECK-NEXT: movq $3, %rax
         CHECK-NEXT: popq %rdx
         CHECK-NEXT: imulq %rdx, %rax
         CHECK-NEXT: popq %rdx
         CHECK-NEXT: addq %rdx, %rax
         CHECK-NEXT: jmp .Lreturn_1
         CHECK-NEXT: .Lreturn_1:
         CHECK-NEXT: movq %rbp, %rsp
         CHECK-NEXT: popq %rbp
         CHECK-NEXT: ret",
    );
}

#[test]
fn test_allocation_and_dispatch() {
    let asm = x86(&precedence_program());
    check(
        &asm,
        "CHECK: .text
         CHECK-NEXT: .globl asm_main
         CHECK-LABEL: asm_main:
         CHECK: movq $8, %rdi
         CHECK-NEXT: call jcalloc
         CHECK-NEXT: leaq vtable.A(%rip), %r10
         CHECK-NEXT: movq %r10, 0(%rax)
         CHECK-NEXT: pushq %rax
         CHECK-NEXT: popq %rdi
         CHECK-NEXT: movq 0(%rdi), %r10
         CHECK-NEXT: call *8(%r10)
         CHECK-NEXT: movq %rax, %rdi
         CHECK-NEXT: call put
         CHECK: .data
         CHECK-NEXT: .p2align 3
         CHECK-NEXT: vtable.Main:
         CHECK-NEXT: .quad 0
         CHECK-NEXT: vtable.A:
         CHECK-NEXT: .quad 0, method.A.f",
    );
}

#[test]
fn test_override_reuses_parent_slot() {
    let program = program(
        vec![decl("a", class_a())],
        vec![
            assign(ident("a", class_a()), new_object("B")),
            print(call(ident("a", class_a()), "f", vec![], Type::Int)),
        ],
        vec![
            class(
                "A",
                None,
                vec![],
                vec![
                    method("f", Type::Int, vec![], vec![], vec![ret(int(1))]),
                    method("g", Type::Int, vec![], vec![], vec![ret(int(2))]),
                ],
            ),
            class(
                "B",
                Some("A"),
                vec![],
                vec![
                    method("h", Type::Int, vec![], vec![], vec![ret(int(3))]),
                    method("f", Type::Int, vec![], vec![], vec![ret(int(9))]),
                ],
            ),
        ],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK-LABEL: asm_main:
         CHECK: call *8(%r10)
         CHECK-LABEL: vtable.A:
         CHECK-NEXT: .quad 0, method.A.f, method.A.g
         CHECK-NEXT: vtable.B:
         CHECK-NEXT: .quad vtable.A, method.B.f, method.A.g, method.B.h",
    );
}

#[test]
fn test_short_circuit_loop_condition() {
    // while (i < 5 && !a.sideEffect()) i = i + 1;
    let i = || ident("i", Type::Int);
    let cond = binary(
        BinaryOp::And,
        binary(BinaryOp::Lt, i(), int(5)),
        not(call(ident("a", class_a()), "sideEffect", vec![], Type::Boolean)),
    );
    let program = program(
        vec![decl("i", Type::Int), decl("a", class_a())],
        vec![
            assign(ident("a", class_a()), new_object("A")),
            while_loop(cond, assign(i(), binary(BinaryOp::Add, i(), int(1)))),
        ],
        vec![class(
            "A",
            None,
            vec![],
            vec![method(
                "sideEffect",
                Type::Boolean,
                vec![],
                vec![],
                vec![print(int(42)), ret(boolean(false))],
            )],
        )],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK-LABEL: asm_main:
         CHECK: jmp .Lwhile_test_0
         CHECK-NEXT: .Lwhile_body_0:
         CHECK-LABEL: .Lwhile_test_0:
         CHECK: cmpq %rax, %rdx
         CHECK-NEXT: jge .Lskip_0
         CHECK-NOT: .Lskip_0:
         CHECK: call *8(%r10)
         CHECK-NEXT: cmpq $0, %rax
         CHECK-NEXT: je .Lwhile_body_0
         CHECK-NEXT: .Lskip_0:",
    );
}

#[test]
fn test_logical_or_jumps_over_right_operand() {
    // if (new A().flag(1) || new A().flag(2)) System.out.println(7);
    let flag = |n| call(new_object("A"), "flag", vec![int(n)], Type::Boolean);
    let program = program(
        vec![],
        vec![if_else(
            binary(BinaryOp::Or, flag(1), flag(2)),
            print(int(7)),
            None,
        )],
        vec![class(
            "A",
            None,
            vec![],
            vec![method(
                "flag",
                Type::Boolean,
                vec![decl("n", Type::Int)],
                vec![],
                vec![ret(boolean(true))],
            )],
        )],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK-LABEL: asm_main:
         CHECK: movq $1, %rax
         CHECK: call *8(%r10)
         CHECK-NEXT: cmpq $0, %rax
         CHECK-NEXT: jne .Lskip_0
         CHECK-NOT: .Lskip_0:
         CHECK: movq $2, %rax
         CHECK: call *8(%r10)
         CHECK-NEXT: cmpq $0, %rax
         CHECK-NEXT: je .Lelse_0
         CHECK-NEXT: .Lskip_0:
         CHECK-NEXT: movq $7, %rax
         CHECK-LABEL: .Lelse_0:",
    );
}

#[test]
fn test_boolean_values_are_materialized() {
    let program = program(
        vec![],
        vec![print(binary(BinaryOp::Le, int(1), int(2)))],
        vec![],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK: cmpq %rax, %rdx
         CHECK-NEXT: jg .Lfalse_0
         CHECK-NEXT: movq $1, %rax
         CHECK-NEXT: jmp .Lbool_end_0
         CHECK-NEXT: .Lfalse_0:
         CHECK-NEXT: movq $0, %rax
         CHECK-NEXT: .Lbool_end_0:
         CHECK-NEXT: movq %rax, %rdi
         CHECK-NEXT: call put_bool",
    );
}

#[test]
fn test_division_checks_for_zero() {
    let program = program(
        vec![],
        vec![print(binary(BinaryOp::Mod, int(7), int(2)).at(12))],
        vec![],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK: popq %rdx
         CHECK-NEXT: movq %rax, %r10
         CHECK-NEXT: movq %rdx, %rax
         CHECK-NEXT: cmpq $0, %r10
         CHECK-NEXT: jne .Ldiv_ok_0
         CHECK-NEXT: movq $12, %rdi
         CHECK-NEXT: call exception_division
         CHECK-NEXT: .Ldiv_ok_0:
         CHECK-NEXT: pushq %rdx
         CHECK-NEXT: cqto
         CHECK-NEXT: idivq %r10
         CHECK-NEXT: movq %rdx, %rax
         CHECK-NEXT: popq %rdx",
    );
}

#[test]
fn test_array_access_is_bounds_checked() {
    let ints = Type::array_of(Type::Int);
    let program = program(
        vec![],
        vec![
            var_init("xs", ints.clone(), new_array(Type::Int, vec![int(3)]).at(4)),
            print(array_lookup(ident("xs", ints), int(2)).at(5)),
        ],
        vec![],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK-LABEL: asm_main:
         CHECK: movq $4, %rsi
         CHECK-NEXT: call synth.alloc_array
         CHECK: cmpq $0, %rax
         CHECK-NEXT: jl .Lout_of_bounds_0
         CHECK-NEXT: cmpq 0(%rdx), %rax
         CHECK-NEXT: jl .Lin_bounds_0
         CHECK-NEXT: .Lout_of_bounds_0:
         CHECK-NEXT: movq %rax, %rdi
         CHECK-NEXT: movq 0(%rdx), %rsi
         CHECK-NEXT: movq $5, %rdx
         CHECK-NEXT: call exception_array
         CHECK-NEXT: .Lin_bounds_0:
         CHECK-NEXT: movq 8(%rdx,%rax,8), %rax
         CHECK-LABEL: synth.alloc_array:",
    );
}

#[test]
fn test_odd_depth_calls_are_padded() {
    let program = program(
        vec![],
        vec![
            var_init("a", class_a(), new_object("A")),
            print(binary(
                BinaryOp::Add,
                int(1),
                call(ident("a", class_a()), "f", vec![], Type::Int),
            )),
        ],
        vec![class(
            "A",
            None,
            vec![],
            vec![method("f", Type::Int, vec![], vec![], vec![ret(int(1))])],
        )],
    );
    let unit = compile(&program, Arch::X86_64);
    assert_eq!(unit.stats.alignment_pads, 1);
    check(
        &unit.assembly,
        "CHECK: pushq %rcx
         CHECK-NEXT: call *8(%r10)
         CHECK-NEXT: popq %rcx",
    );
}

#[test]
fn test_field_and_parameter_offsets() {
    // class P { int x; int set(int v) { x = v; return x; } }
    let program = program(
        vec![],
        vec![print(call(new_object("P"), "set", vec![int(5)], Type::Int))],
        vec![class(
            "P",
            None,
            vec![decl("x", Type::Int)],
            vec![method(
                "set",
                Type::Int,
                vec![decl("v", Type::Int)],
                vec![],
                vec![
                    assign(ident("x", Type::Int), ident("v", Type::Int)),
                    ret(ident("x", Type::Int)),
                ],
            )],
        )],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK-LABEL: asm_main:
         CHECK: movq $16, %rdi
         CHECK-NEXT: call jcalloc
         CHECK: popq %rsi
         CHECK-NEXT: popq %rdi
         CHECK-LABEL: method.P.set:
         CHECK: subq $16, %rsp
         CHECK-NEXT: movq %rdi, -8(%rbp)
         CHECK-NEXT: movq %rsi, -16(%rbp)
         CHECK-NEXT: movq -8(%rbp), %rax
         CHECK-NEXT: leaq 8(%rax), %rax
         CHECK-NEXT: pushq %rax
         CHECK-NEXT: movq -16(%rbp), %rax
         CHECK-NEXT: popq %rdx
         CHECK-NEXT: movq %rax, 0(%rdx)",
    );
}

#[test]
fn test_switch_falls_through_without_break() {
    let x = || ident("x", Type::Int);
    let program = program(
        vec![decl("x", Type::Int)],
        vec![Statement::Switch {
            scrutinee: x(),
            cases: vec![
                SwitchCase {
                    label: CaseLabel::Value(1),
                    body: vec![print(int(10))],
                    breaks: false,
                },
                SwitchCase {
                    label: CaseLabel::Value(2),
                    body: vec![print(int(20))],
                    breaks: true,
                },
                SwitchCase {
                    label: CaseLabel::Default,
                    body: vec![print(int(30))],
                    breaks: false,
                },
            ],
        }],
        vec![],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK: cmpq $1, %rax
         CHECK-NEXT: je .Lcase_0
         CHECK-NEXT: cmpq $2, %rax
         CHECK-NEXT: je .Lcase_1
         CHECK-NEXT: jmp .Lcase_2
         CHECK-NEXT: .Lcase_0:
         CHECK-NOT: jmp .Lswitch_end_0
         CHECK: .Lcase_1:
         CHECK: call put
         CHECK-NEXT: jmp .Lswitch_end_0
         CHECK-NEXT: .Lcase_2:
         CHECK: call put
         CHECK-NEXT: .Lswitch_end_0:",
    );
}

#[test]
fn test_string_concatenation_pulls_in_helpers() {
    let program = program(
        vec![],
        vec![print(binary(BinaryOp::Add, string("n="), int(4)))],
        vec![],
    );
    let unit = compile(&program, Arch::X86_64);
    assert_eq!(unit.stats.helpers, 3);
    assert_eq!(unit.stats.strings, 1);
    check(
        &unit.assembly,
        "CHECK-LABEL: asm_main:
         CHECK: leaq .Lstr_0(%rip), %rax
         CHECK: call synth.concat_string_int
         CHECK: call put_string
         CHECK-LABEL: synth.concat_string_int:
         CHECK-LABEL: synth.concat_strings:
         CHECK-LABEL: synth.int_to_string:
         CHECK-LABEL: .Lstr_0:
         CHECK-NEXT: .quad 2, 110, 61",
    );
    assert_eq!(unit.assembly.matches("synth.concat_strings:").count(), 1);
    assert!(!unit.assembly.contains("synth.bool_to_string:"));
}

#[test]
fn test_instanceof_walks_parent_tables() {
    let program = program(
        vec![],
        vec![print(instance_of(new_object("B"), "A"))],
        vec![
            class("A", None, vec![], vec![]),
            class("B", Some("A"), vec![], vec![]),
        ],
    );
    let asm = x86(&program);
    check(
        &asm,
        "CHECK: je .Linstanceof_false_0
         CHECK-NEXT: movq 0(%rax), %rax
         CHECK-NEXT: leaq vtable.A(%rip), %r10
         CHECK-NEXT: .Linstanceof_walk_0:
         CHECK-NEXT: cmpq %r10, %rax
         CHECK-NEXT: je .Linstanceof_true_0
         CHECK-NEXT: movq 0(%rax), %rax
         CHECK-NEXT: cmpq $0, %rax
         CHECK-NEXT: jne .Linstanceof_walk_0",
    );
}

#[test]
fn test_methods_leave_stack_balanced() {
    let i = || ident("i", Type::Int);
    let program = program(
        vec![decl("i", Type::Int)],
        vec![
            assign(i(), int(0)),
            while_loop(
                binary(BinaryOp::Lt, i(), int(3)),
                block(vec![
                    if_else(
                        binary(BinaryOp::Eq, binary(BinaryOp::Mod, i(), int(2)), int(0)),
                        print(string("even")),
                        Some(print(unary(UnaryOp::Neg, i()))),
                    ),
                    expr_stmt(increment(minijc::ast::IncrementOp::PostInc, i())),
                ]),
            ),
        ],
        vec![],
    );
    let asm = x86(&program);
    let mut depth = 0i64;
    for line in asm.lines().map(str::trim) {
        if line.ends_with(':') && !line.starts_with(".L") {
            assert_eq!(depth, 0, "unbalanced before {line}");
        }
        if line.starts_with("pushq") {
            depth += 1;
        } else if line.starts_with("popq") {
            depth -= 1;
        }
        assert!(depth >= 0, "pop below the frame at `{line}`");
    }
    assert_eq!(depth, 0);
}

#[test]
fn test_labels_are_unique() {
    let asm = x86(&precedence_program());
    let mut seen = HashSet::new();
    for label in asm.lines().filter(|l| l.ends_with(':')) {
        assert!(seen.insert(label), "duplicate label {label}");
    }
}

#[test]
fn test_arm64_listing() {
    let asm = arm64(&precedence_program());
    check(
        &asm,
        "CHECK-LABEL: asm_main:
         CHECK-NEXT: stp x29, x30, [sp, #-16]!
         CHECK-NEXT: mov x29, sp
         CHECK-NEXT: sub sp, sp, #16
         CHECK: bl jcalloc
         CHECK-NEXT: mov x9, x0
         CHECK-NEXT: adrp x10, vtable.A
         CHECK-NEXT: add x10, x10, :lo12:vtable.A
         CHECK-NEXT: stur x10, [x9, #0]
         CHECK: ldur x16, [x10, #8]
         CHECK-NEXT: blr x16
         CHECK: bl put
         CHECK-LABEL: method.A.f:
         CHECK: mul x9, x9, x2
         CHECK: ldp x29, x30, [sp], #16
         CHECK-NEXT: mov x0, x9
         CHECK-NEXT: ret",
    );
}

#[test]
fn test_assigning_to_a_literal_is_rejected() {
    let program = program(vec![], vec![assign(int(1), int(2))], vec![]);
    let err = compile_program(&program, &CodegenOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedNode { .. }));
    assert!(err.is_internal());
}

#[test]
fn test_non_boolean_condition_is_rejected() {
    let program = program(
        vec![],
        vec![if_else(int(1), print(int(1)), None)],
        vec![],
    );
    let err = compile_program(&program, &CodegenOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }));
}
