//! Symbols provided by the C runtime linked with every compiled program.

/// Source of the C runtime, written out by `minijc --emit-runtime`.
pub const BOOT_C: &str = include_str!("../runtime/boot.c");

/// `put(int64)`: print an integer and a newline.
pub const PUT: &str = "put";
/// `put_bool(int64)`: print `true` or `false`.
pub const PUT_BOOL: &str = "put_bool";
/// `put_string(int64*)`: print a word-per-character string.
pub const PUT_STRING: &str = "put_string";
/// `jcalloc(bytes)`: zeroed heap allocation; never returns null.
pub const CALLOC: &str = "jcalloc";
/// `jmemcpy(dst, src, bytes)`.
pub const MEMCPY: &str = "jmemcpy";
/// `exception_array(index, length, line)`: does not return.
pub const EXCEPTION_ARRAY: &str = "exception_array";
/// `exception_array_size(size, line)`: does not return.
pub const EXCEPTION_ARRAY_SIZE: &str = "exception_array_size";
/// `exception_division(line)`: does not return.
pub const EXCEPTION_DIVISION: &str = "exception_division";
