//! Shared helpers for the integration tests.

#![allow(dead_code)]

use minijc::ast::Program;
use minijc::filecheck::FileChecker;
use minijc::{compile_program, runtime, Arch, CodegenOptions, CompiledUnit};
use std::fs;
use std::process::{Command, Output};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compile for `arch` without trailing comments.
pub fn compile(program: &Program, arch: Arch) -> CompiledUnit {
    init_logging();
    compile_program(program, &CodegenOptions::for_arch(arch).without_comments())
        .unwrap_or_else(|e| panic!("compilation failed: {e}"))
}

pub fn x86(program: &Program) -> String {
    compile(program, Arch::X86_64).assembly
}

pub fn arm64(program: &Program) -> String {
    compile(program, Arch::Arm64).assembly
}

/// Assert `output` satisfies the CHECK directives in `spec`.
pub fn check(output: &str, spec: &str) {
    if let Err(e) = FileChecker::new(false).check_str(output, spec) {
        panic!("{e}\n--- output ---\n{output}");
    }
}

/// The target matching the machine running the tests, if supported.
pub fn host_arch() -> Option<Arch> {
    if cfg!(all(target_arch = "x86_64", target_os = "linux")) {
        Some(Arch::X86_64)
    } else if cfg!(all(target_arch = "aarch64", target_os = "linux")) {
        Some(Arch::Arm64)
    } else {
        None
    }
}

fn have_cc() -> bool {
    Command::new("cc")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Compile `program` for the host, link it with the runtime and run the executable.
///
/// Returns `None`, after saying why, when the host cannot run the output.
fn build_and_run(program: &Program) -> Option<Output> {
    let Some(arch) = host_arch() else {
        eprintln!("skipping: no supported target for this host");
        return None;
    };
    if !have_cc() {
        eprintln!("skipping: no C compiler on PATH");
        return None;
    }

    let unit = compile(program, arch);
    let dir = tempfile::tempdir().expect("temporary directory");
    let asm = dir.path().join("out.s");
    let boot = dir.path().join("boot.c");
    let exe = dir.path().join("prog");
    fs::write(&asm, &unit.assembly).expect("write assembly");
    fs::write(&boot, runtime::BOOT_C).expect("write runtime");

    let link = Command::new("cc")
        .arg("-o")
        .arg(&exe)
        .arg(&asm)
        .arg(&boot)
        .output()
        .expect("run cc");
    assert!(
        link.status.success(),
        "cc failed:\n{}\n--- assembly ---\n{}",
        String::from_utf8_lossy(&link.stderr),
        unit.assembly
    );

    Some(Command::new(&exe).output().expect("run program"))
}

/// Run `program` on the host and return its stdout; it must exit successfully.
pub fn run(program: &Program) -> Option<String> {
    let out = build_and_run(program)?;
    assert!(
        out.status.success(),
        "program exited with {}:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
    Some(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Like [`run`] but expects the program to fail; returns its stdout and stderr.
pub fn run_failing(program: &Program) -> Option<(String, String)> {
    let out = build_and_run(program)?;
    assert!(!out.status.success(), "program unexpectedly succeeded");
    Some((
        String::from_utf8_lossy(&out.stdout).into_owned(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    ))
}
