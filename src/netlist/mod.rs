//! SPICE netlist reader.
//!
//! The first line of a netlist is its title. Every following line is a
//! device card, a dot command or a comment, and the file must end with
//! `.END`; anything after it is ignored.
//!
//! # Grammar Overview
//!
//! ```text
//! netlist     = title newline { line } ".END"
//! line        = comment | directive | card | empty
//! comment     = '*' { any_char } | ';' { any_char }
//! card        = name node+ { field }
//! value       = number [suffix] [unit] | '{' identifier '}'
//! suffix      = 'f' | 'p' | 'n' | 'u' | 'µ' | 'm' | 'k' | "meg" | 'g' | 't'
//! ```
//!
//! Suffixes are case-insensitive, so `M` is milli and `MEG` is mega.
//!
//! # Cards
//!
//! | Prefix | Device | Syntax |
//! |--------|--------|--------|
//! | R | Resistor | `R<name> <n+> <n-> <value>` |
//! | C | Capacitor | `C<name> <n+> <n-> <value> [IC=<v>]` |
//! | L | Inductor | `L<name> <n+> <n-> <value> [IC=<i>]` |
//! | V | Voltage source | `V<name> <n+> <n-> [DC] <value> [AC <amp>] [SINE(<off> <amp> <freq>)]` |
//! | I | Current source | same as `V` |
//! | D | Diode | `D<name> <anode> <cathode> [model]` |
//! | Q | BJT | `Q<name> <c> <b> <e> [model]` |
//!
//! Cards for `M E G H F J K B X S W T` devices are skipped with a warning.
//!
//! # Directives
//!
//! | Directive | Syntax |
//! |-----------|--------|
//! | .MODEL | `.MODEL <name> D\|NPN\|PNP (<key>=<value> ...)` or positional values |
//! | .OP | `.OP` |
//! | .TRAN | `.TRAN <tstep> <tstop> [<tstart> [<tmax>]]` |
//! | .STEP | `.STEP [param] <var> <start> <stop> <inc>`, `.STEP [param] <var> list <v>...`, `.STEP oct\|dec [param] <var> <start> <stop> <points>` |
//! | .END | `.END` |
//!
//! # Example
//!
//! ```text
//! RC low-pass
//! V1   in   0    SINE(0 1 1k)
//! R1   in   out  {R}
//! C1   out  0    100n
//! .STEP param R list 1k 10k
//! .TRAN 0 5m 0 10u
//! .END
//! ```

mod ast;
mod lexer;
mod parser;

use std::path::Path;

pub use ast::*;
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::{Parser, DEFAULT_DIODE_MODEL, DEFAULT_TRANSISTOR_MODEL};

use crate::error::{NodalError, Result};

/// Parse a netlist string.
pub fn parse(input: &str) -> Result<Netlist> {
    let (title, body) = input.split_once('\n').unwrap_or((input, ""));
    let lexer = Lexer::starting_at(body, 2);
    let mut parser = Parser::new(lexer)?;
    parser.parse(title.trim())
}

/// Parse a netlist file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Netlist> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| NodalError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_first_line() {
        let netlist = parse("My Amp\r\n.end\r\n").unwrap();
        assert_eq!(netlist.title, "My Amp");
    }

    #[test]
    fn test_title_only_is_missing_end() {
        assert!(matches!(parse("just a title"), Err(NodalError::MissingEnd)));
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file("/nonexistent/circuit.cir").unwrap_err();
        assert!(matches!(err, NodalError::FileReadError { .. }));
    }

    #[test]
    fn test_title_line_is_not_a_card() {
        // A title that looks like a card must not be parsed as one
        let netlist = parse("R1 a 0 1k\nR2 a 0 2k\n.end").unwrap();
        assert_eq!(netlist.components.len(), 1);
        assert_eq!(netlist.components[0].name, "R2");
    }
}
