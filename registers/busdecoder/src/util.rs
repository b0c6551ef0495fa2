// Licensed under the Apache-2.0 license

//! Utility functions for widths and SystemVerilog formatting.

/// Ceiling of log2. `clog2(0)` and `clog2(1)` are 0.
///
/// # Examples
/// ```
/// use registers_busdecoder::util::clog2;
/// assert_eq!(clog2(1), 0);
/// assert_eq!(clog2(0x10), 4);
/// assert_eq!(clog2(0x11), 5);
/// ```
pub fn clog2(n: u64) -> u64 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros() as u64
    }
}

pub fn is_pow2(n: u64) -> bool {
    n != 0 && n & (n - 1) == 0
}

/// Formats a sized SystemVerilog hex literal.
///
/// # Examples
/// ```
/// use registers_busdecoder::util::sv_int;
/// assert_eq!(sv_int(0x10, 32), "32'h10");
/// assert_eq!(sv_int(0x1234_5678, 32), "32'h1234_5678");
/// ```
pub fn sv_int(val: u64, width: u64) -> String {
    format!("{width}'h{}", hex_digits(val))
}

fn hex_digits(val: u64) -> String {
    let mut x = String::new();
    for (i, c) in format!("{val:x}").chars().rev().enumerate() {
        if i % 4 == 0 && i != 0 {
            x.push('_');
        }
        x.push(c);
    }
    x.chars().rev().collect()
}

/// Converts a dotted node path into a SystemVerilog identifier.
pub fn sv_ident(path: &str) -> String {
    let mut result = String::new();
    if path.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        result.push('_');
    }
    for c in path.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
        } else if !result.ends_with('_') {
            result.push('_');
        }
    }
    tweak_keywords(&result).to_string()
}

/// Appends underscore suffix to SystemVerilog keywords to avoid conflicts.
fn tweak_keywords(s: &str) -> &str {
    match s {
        "always" => "always_",
        "assign" => "assign_",
        "begin" => "begin_",
        "case" => "case_",
        "default" => "default_",
        "else" => "else_",
        "end" => "end_",
        "for" => "for_",
        "function" => "function_",
        "if" => "if_",
        "input" => "input_",
        "int" => "int_",
        "logic" => "logic_",
        "module" => "module_",
        "output" => "output_",
        "package" => "package_",
        "parameter" => "parameter_",
        "reg" => "reg_",
        "struct" => "struct_",
        "type" => "type_",
        "typedef" => "typedef_",
        "wire" => "wire_",
        s => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clog2() {
        assert_eq!(clog2(0), 0);
        assert_eq!(clog2(2), 1);
        assert_eq!(clog2(4), 2);
        assert_eq!(clog2(5), 3);
        assert_eq!(clog2(1 << 40), 40);
    }

    #[test]
    fn test_is_pow2() {
        assert!(is_pow2(8));
        assert!(!is_pow2(0));
        assert!(!is_pow2(24));
    }

    #[test]
    fn test_sv_ident() {
        assert_eq!(sv_ident("blk.regs"), "blk_regs");
        assert_eq!(sv_ident("reg"), "reg_");
        assert_eq!(sv_ident("0ch"), "_0ch");
    }
}
