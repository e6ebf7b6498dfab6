//! Parser for SPICE netlists.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::ast::*;
use super::lexer::{parse_value, Lexer, Token, TokenKind};
use crate::circuit::{Analysis, SweepKind};
use crate::components::{Value, Waveform};
use crate::error::{NodalError, Result};

/// Positional `.MODEL` parameter order for diodes.
const DIODE_POSITIONAL: &[&str] = &["is", "rs", "cj0", "tt", "bv", "ibv"];

/// Positional `.MODEL` parameter order for transistors.
const TRANSISTOR_POSITIONAL: &[&str] = &["bf", "is", "vaf"];

/// Model used by a D card that names none.
pub const DEFAULT_DIODE_MODEL: &str = "D";

/// Model used by a Q card that names none.
pub const DEFAULT_TRANSISTOR_MODEL: &str = "NPN";

/// Parser for netlist bodies (everything after the title line).
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse every card up to `.END`.
    pub fn parse(&mut self, title: &str) -> Result<Netlist> {
        let mut netlist = Netlist::new(title);
        let mut seen_end = false;

        while self.current.kind != TokenKind::Eof {
            match self.current.kind {
                TokenKind::Newline => {
                    self.advance()?;
                    continue;
                }
                TokenKind::Directive => {
                    if self.parse_directive(&mut netlist)? {
                        seen_end = true;
                        break;
                    }
                }
                TokenKind::Identifier => {
                    if let Some(component) = self.parse_component()? {
                        netlist.components.push(component);
                    }
                }
                _ => {
                    return Err(NodalError::parse(
                        self.current.line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }

            if !self.at_line_end() {
                return Err(NodalError::parse(
                    self.current.line,
                    format!("unexpected trailing field: {:?}", self.current.text),
                ));
            }
        }

        if !seen_end {
            return Err(NodalError::MissingEnd);
        }
        Ok(netlist)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn at_line_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn skip_line(&mut self) -> Result<()> {
        while !self.at_line_end() {
            self.advance()?;
        }
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(NodalError::parse(
                self.current.line,
                format!("expected {:?}, got {:?}", kind, self.current.kind),
            ))
        }
    }

    /// A bare word: identifiers and numbers both name nodes and models.
    fn word(&mut self) -> Result<Option<String>> {
        match self.current.kind {
            TokenKind::Identifier | TokenKind::Number => {
                let text = self.current.text.clone();
                self.advance()?;
                Ok(Some(text))
            }
            _ => Ok(None),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let tok = self.expect(TokenKind::Number)?;
        parse_value(&tok.text).ok_or_else(|| NodalError::parse(tok.line, format!("invalid number: {}", tok.text)))
    }

    fn keyword_is(&self, keyword: &str) -> bool {
        self.current.kind == TokenKind::Identifier && self.current.text.eq_ignore_ascii_case(keyword)
    }

    /// Returns `true` when the directive was `.END`.
    fn parse_directive(&mut self, netlist: &mut Netlist) -> Result<bool> {
        let directive = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        match directive.to_lowercase().as_str() {
            ".end" => return Ok(true),
            ".op" => {
                netlist.analyses.push(Analysis::OperatingPoint);
                self.skip_line()?;
            }
            ".tran" => {
                let analysis = self.parse_tran(line)?;
                netlist.analyses.push(analysis);
            }
            ".step" => {
                let (name, sweep) = self.parse_step(line)?;
                if netlist.sweeps.insert(name.clone(), sweep).is_some() {
                    warn!(line, variable = %name, "variable stepped twice, keeping the last sweep");
                }
            }
            ".model" => {
                let model = self.parse_model_def(line)?;
                if netlist.models.contains_key(&model.name) {
                    return Err(NodalError::parse(line, format!("duplicate model: {}", model.name)));
                }
                netlist.models.insert(model.name.clone(), model);
            }
            _ => {
                warn!(line, directive = %directive, "unsupported directive skipped");
                self.skip_line()?;
            }
        }

        Ok(false)
    }

    /// `.TRAN tstep tstop [tstart [tmax]]`; the last field, when present,
    /// is used as the fixed step.
    fn parse_tran(&mut self, line: usize) -> Result<Analysis> {
        let mut fields = Vec::new();
        while !self.at_line_end() {
            if self.current.kind == TokenKind::Number {
                fields.push(self.number()?);
            } else {
                debug!(line, field = %self.current.text, "ignoring .TRAN option");
                self.advance()?;
            }
        }

        let analysis = match fields.as_slice() {
            [step, stop] => Analysis::transient(*stop, 0.0, *step),
            [step, stop, start] => Analysis::transient(*stop, *start, *step),
            [_, stop, start, step] => Analysis::transient(*stop, *start, *step),
            _ => {
                return Err(NodalError::parse(
                    line,
                    format!(".TRAN expects 2 to 4 values, got {}", fields.len()),
                ))
            }
        };

        if let Analysis::Transient { stop, step, .. } = analysis {
            if stop <= 0.0 || step <= 0.0 {
                return Err(NodalError::InvalidSimulationParam {
                    message: format!("line {}: .TRAN needs a positive stop time and step", line),
                });
            }
        }
        Ok(analysis)
    }

    /// `.STEP [oct|dec] [param] VAR start stop n` or `.STEP [param] VAR list v...`.
    fn parse_step(&mut self, line: usize) -> Result<(String, SweepKind)> {
        let mut scale = None;
        if self.keyword_is("oct") || self.keyword_is("dec") {
            scale = Some(self.current.text.to_lowercase());
            self.advance()?;
        }
        if self.keyword_is("param") {
            self.advance()?;
        }

        let name = match self.current.kind {
            TokenKind::Identifier | TokenKind::Variable => {
                let text = self.current.text.clone();
                self.advance()?;
                text
            }
            _ => return Err(NodalError::parse(line, ".STEP is missing the variable name")),
        };

        if self.keyword_is("list") {
            self.advance()?;
            let mut values = Vec::new();
            while !self.at_line_end() {
                values.push(self.number()?);
            }
            if values.is_empty() {
                return Err(NodalError::parse(line, ".STEP list has no values"));
            }
            return Ok((name, SweepKind::List(values)));
        }

        let start = self.number()?;
        let stop = self.number()?;
        let third = self.number()?;

        let sweep = match scale.as_deref() {
            Some(scale) => {
                if start <= 0.0 || stop <= 0.0 || third <= 0.0 {
                    return Err(NodalError::InvalidSimulationParam {
                        message: format!("line {}: logarithmic .STEP needs positive bounds and points", line),
                    });
                }
                if stop <= start {
                    return Err(NodalError::InvalidSimulationParam {
                        message: format!("line {}: logarithmic .STEP stop must exceed start", line),
                    });
                }
                if scale == "oct" {
                    SweepKind::Octave {
                        start,
                        stop,
                        points: third,
                    }
                } else {
                    SweepKind::Decade {
                        start,
                        stop,
                        points: third,
                    }
                }
            }
            None => {
                if third <= 0.0 {
                    return Err(NodalError::InvalidSimulationParam {
                        message: format!("line {}: .STEP increment must be positive", line),
                    });
                }
                SweepKind::Linear {
                    start,
                    stop,
                    step: third,
                }
            }
        };
        Ok((name, sweep))
    }

    /// `.MODEL name kind [(] params [)]`, params as `key=value` or positional.
    fn parse_model_def(&mut self, line: usize) -> Result<ModelDef> {
        let name = self
            .word()?
            .ok_or_else(|| NodalError::parse(line, ".MODEL is missing the model name"))?;
        let kind = self
            .word()?
            .ok_or_else(|| NodalError::parse(line, format!(".MODEL {} is missing the model type", name)))?;

        let positional = if kind.eq_ignore_ascii_case("d") {
            DIODE_POSITIONAL
        } else if kind.eq_ignore_ascii_case("npn") || kind.eq_ignore_ascii_case("pnp") {
            TRANSISTOR_POSITIONAL
        } else {
            return Err(NodalError::parse(line, format!("unknown model type: {}", kind)));
        };

        let mut params = BTreeMap::new();
        let mut position = 0;
        while !self.at_line_end() {
            match self.current.kind {
                TokenKind::OpenParen | TokenKind::CloseParen => self.advance()?,
                TokenKind::Identifier => {
                    let key = self.current.text.to_lowercase();
                    self.advance()?;
                    self.expect(TokenKind::Equals)?;
                    params.insert(key, self.number()?);
                }
                TokenKind::Number => {
                    let value = self.number()?;
                    let key = positional.get(position).ok_or_else(|| NodalError::InvalidParameter {
                        component: name.clone(),
                        param: format!("#{}", position + 1),
                        message: format!("too many positional values, at most {}", positional.len()),
                    })?;
                    params.insert(key.to_string(), value);
                    position += 1;
                }
                _ => {
                    return Err(NodalError::parse(
                        line,
                        format!("unexpected token in .MODEL: {:?}", self.current.text),
                    ))
                }
            }
        }

        Ok(ModelDef { name, kind, params })
    }

    /// Parse a device card. Unsupported SPICE devices yield `None`.
    fn parse_component(&mut self) -> Result<Option<ComponentDef>> {
        let name = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        let prefix = name.chars().next().unwrap_or('?').to_ascii_uppercase();
        let Some(component_type) = ComponentType::from_prefix(prefix) else {
            if UNSUPPORTED_PREFIXES.contains(&prefix) {
                warn!(line, card = %name, "unsupported device skipped");
                self.skip_line()?;
                return Ok(None);
            }
            return Err(NodalError::invalid_component(&name, line, "unknown component type"));
        };

        let expected_nodes = component_type.expected_node_count();
        let mut nodes = Vec::with_capacity(expected_nodes);
        while nodes.len() < expected_nodes {
            match self.word()? {
                Some(node) => nodes.push(node),
                None => {
                    return Err(NodalError::invalid_component(
                        &name,
                        line,
                        format!("expected {} nodes, got {}", expected_nodes, nodes.len()),
                    ))
                }
            }
        }

        let kind = match component_type {
            ComponentType::Resistor | ComponentType::Capacitor | ComponentType::Inductor => {
                self.parse_passive(&name, line, component_type)?
            }
            ComponentType::VoltageSource | ComponentType::CurrentSource => {
                ComponentKind::Source(self.parse_waveform(&name, line)?)
            }
            ComponentType::Diode => ComponentKind::Model(self.parse_model_ref(&name, line, DEFAULT_DIODE_MODEL)?),
            ComponentType::Bjt => ComponentKind::Model(self.parse_model_ref(&name, line, DEFAULT_TRANSISTOR_MODEL)?),
        };

        Ok(Some(ComponentDef {
            component_type,
            name,
            nodes,
            kind,
            line,
        }))
    }

    fn parse_value(&mut self, name: &str, line: usize) -> Result<Value> {
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Number => {
                self.advance()?;
                parse_value(&tok.text)
                    .map(Value::Literal)
                    .ok_or_else(|| NodalError::invalid_component(name, line, format!("invalid value: {}", tok.text)))
            }
            TokenKind::Variable => {
                self.advance()?;
                Ok(Value::Variable(tok.text))
            }
            _ => Err(NodalError::invalid_component(name, line, "missing value")),
        }
    }

    /// `value [IC=v | v]`
    fn parse_passive(&mut self, name: &str, line: usize, component_type: ComponentType) -> Result<ComponentKind> {
        let value = self.parse_value(name, line)?;
        if let Value::Literal(v) = value {
            if v <= 0.0 && component_type != ComponentType::Resistor {
                return Err(NodalError::invalid_component(name, line, "value must be positive"));
            }
            if v == 0.0 {
                return Err(NodalError::invalid_component(name, line, "resistance must be non-zero"));
            }
        }

        let mut initial = None;
        if self.keyword_is("ic") {
            self.advance()?;
            self.expect(TokenKind::Equals)?;
            initial = Some(self.number()?);
        } else if self.current.kind == TokenKind::Number && component_type != ComponentType::Resistor {
            initial = Some(self.number()?);
        }

        Ok(ComponentKind::Passive { value, initial })
    }

    /// `[DC] [value] [AC amp] [SINE(offset amp freq)]` in any order.
    fn parse_waveform(&mut self, name: &str, line: usize) -> Result<Waveform> {
        let mut waveform = Waveform::dc(0.0);
        while !self.at_line_end() {
            if self.keyword_is("dc") {
                self.advance()?;
                waveform.dc = self.parse_value(name, line)?;
            } else if self.keyword_is("ac") {
                self.advance()?;
                waveform.small_signal = self.number()?;
                // Optional phase
                if self.current.kind == TokenKind::Number {
                    self.advance()?;
                }
            } else if self.keyword_is("sine") || self.keyword_is("sin") {
                self.advance()?;
                self.expect(TokenKind::OpenParen)?;
                let mut fields = Vec::new();
                while self.current.kind == TokenKind::Number {
                    fields.push(self.number()?);
                }
                self.expect(TokenKind::CloseParen)?;
                if fields.len() < 3 {
                    return Err(NodalError::invalid_component(
                        name,
                        line,
                        "SINE needs offset, amplitude and frequency",
                    ));
                }
                if fields.len() > 3 {
                    debug!(line, source = %name, "ignoring SINE fields after the frequency");
                }
                waveform.sine_offset = fields[0];
                waveform.sine_amplitude = fields[1];
                waveform.sine_frequency = fields[2];
            } else if matches!(self.current.kind, TokenKind::Number | TokenKind::Variable) {
                waveform.dc = self.parse_value(name, line)?;
            } else {
                return Err(NodalError::invalid_component(
                    name,
                    line,
                    format!("unexpected source field: {}", self.current.text),
                ));
            }
        }
        Ok(waveform)
    }

    /// Optional model name; a Q card may carry a substrate node before it.
    fn parse_model_ref(&mut self, name: &str, line: usize, default: &str) -> Result<String> {
        let mut words = Vec::new();
        while !self.at_line_end() {
            match self.word()? {
                Some(word) => words.push(word),
                None => {
                    return Err(NodalError::invalid_component(
                        name,
                        line,
                        format!("unexpected field: {}", self.current.text),
                    ))
                }
            }
        }
        let model = words
            .iter()
            .rev()
            .find(|w| parse_value(w).is_none())
            .cloned()
            .unwrap_or_else(|| default.to_string());
        if words.len() > 1 {
            debug!(line, device = %name, model = %model, "ignoring extra device fields");
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_resistor() {
        let netlist = parse("title\nR1 in out 10k\n.END\n").unwrap();
        assert_eq!(netlist.title, "title");
        assert_eq!(netlist.components.len(), 1);
        let card = &netlist.components[0];
        assert_eq!(card.component_type, ComponentType::Resistor);
        assert_eq!(card.name, "R1");
        assert_eq!(card.nodes, vec!["in", "out"]);
        assert_eq!(
            card.kind,
            ComponentKind::Passive {
                value: Value::Literal(10_000.0),
                initial: None
            }
        );
        assert_eq!(card.line, 2);
    }

    #[test]
    fn test_missing_end() {
        assert!(matches!(parse("title\nR1 a 0 1k\n"), Err(NodalError::MissingEnd)));
    }

    #[test]
    fn test_cards_after_end_are_ignored() {
        let netlist = parse("t\nR1 a 0 1k\n.end\nR2 b 0 1k\n").unwrap();
        assert_eq!(netlist.components.len(), 1);
    }

    #[test]
    fn test_parse_variable_value() {
        let netlist = parse("t\nR1 a 0 {RLOAD}\n.step param RLOAD list 1k 2k 3k\n.end").unwrap();
        let ComponentKind::Passive { value, .. } = &netlist.components[0].kind else {
            panic!("expected passive");
        };
        assert_eq!(value, &Value::Variable("RLOAD".to_string()));
        assert_eq!(netlist.sweeps["RLOAD"], SweepKind::List(vec![1000.0, 2000.0, 3000.0]));
    }

    #[test]
    fn test_parse_capacitor_initial_condition() {
        let netlist = parse("t\nC1 a 0 1u IC=2.5\nL1 a b 1m 0.1\n.end").unwrap();
        assert_eq!(
            netlist.components[0].kind,
            ComponentKind::Passive {
                value: Value::Literal(1e-6),
                initial: Some(2.5)
            }
        );
        let ComponentKind::Passive { initial, .. } = netlist.components[1].kind else {
            panic!("expected passive");
        };
        assert_eq!(initial, Some(0.1));
    }

    #[test]
    fn test_parse_sources() {
        let netlist = parse("t\nV1 in 0 DC 5 AC 1\nV2 a 0 SINE(0 1 1k)\nI1 b 0 2m\n.end").unwrap();
        let ComponentKind::Source(w) = &netlist.components[0].kind else {
            panic!("expected source");
        };
        assert_eq!(w.dc, Value::Literal(5.0));
        assert_eq!(w.small_signal, 1.0);

        let ComponentKind::Source(w) = &netlist.components[1].kind else {
            panic!("expected source");
        };
        assert_eq!(w.sine_amplitude, 1.0);
        assert_relative_eq!(w.sine_frequency, 1000.0);

        let ComponentKind::Source(w) = &netlist.components[2].kind else {
            panic!("expected source");
        };
        assert_eq!(w.dc, Value::Literal(2e-3));
    }

    #[test]
    fn test_parse_model_keyed_and_positional() {
        let netlist = parse("t\n.model DCLIP D (IS=1e-14 RS=0.5)\n.MODEL D2 D 2e-14 1\n.end").unwrap();
        let model = &netlist.models["DCLIP"];
        assert!(model.is_diode());
        assert_relative_eq!(model.params["is"], 1e-14);
        assert_relative_eq!(model.params["rs"], 0.5);

        let model = &netlist.models["D2"];
        assert_relative_eq!(model.params["is"], 2e-14);
        assert_relative_eq!(model.params["rs"], 1.0);
    }

    #[test]
    fn test_diode_default_model() {
        let netlist = parse("t\nD1 a 0\nD2 a 0 DCLIP\nQ1 c b e\n.end").unwrap();
        assert_eq!(netlist.components[0].kind, ComponentKind::Model("D".to_string()));
        assert_eq!(netlist.components[1].kind, ComponentKind::Model("DCLIP".to_string()));
        assert_eq!(netlist.components[2].kind, ComponentKind::Model("NPN".to_string()));
    }

    #[test]
    fn test_parse_tran_forms() {
        let netlist = parse("t\n.tran 1u 1m\n.tran 0 1m 0.5m 2u\n.op\n.end").unwrap();
        assert_eq!(netlist.analyses[0], Analysis::transient(1e-3, 0.0, 1e-6));
        assert_eq!(netlist.analyses[1], Analysis::transient(1e-3, 0.5e-3, 2e-6));
        assert_eq!(netlist.analyses[2], Analysis::OperatingPoint);
    }

    #[test]
    fn test_parse_step_forms() {
        let netlist = parse("t\n.step param R 1k 3k 1k\n.step dec param C 1n 1u 10\n.end").unwrap();
        assert_eq!(
            netlist.sweeps["R"],
            SweepKind::Linear {
                start: 1000.0,
                stop: 3000.0,
                step: 1000.0
            }
        );
        assert!(matches!(netlist.sweeps["C"], SweepKind::Decade { .. }));
    }

    #[test]
    fn test_log_step_needs_increasing_bounds() {
        for card in [".step dec param R 1k 1k 10", ".step oct param R 1k 100 2"] {
            let input = format!("t\nR1 in 0 {{R}}\n{}\n.op\n.end", card);
            assert!(
                matches!(parse(&input), Err(NodalError::InvalidSimulationParam { .. })),
                "{} should be rejected",
                card
            );
        }
    }

    #[test]
    fn test_unsupported_device_skipped() {
        let netlist = parse("t\nM1 d g s s NMOS\nE1 a 0 b 0 10\nR1 a 0 1k\n.options abstol=1n\n.end").unwrap();
        assert_eq!(netlist.components.len(), 1);
    }

    #[test]
    fn test_too_few_nodes() {
        let err = parse("t\nR1 a\n.end").unwrap_err();
        assert!(matches!(err, NodalError::InvalidComponent { line: 2, .. }));
    }

    #[test]
    fn test_unknown_prefix() {
        assert!(matches!(
            parse("t\nZ1 a 0 1\n.end"),
            Err(NodalError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse("t\nR1 a 0 1k 2k\n.end").is_err());
    }

    #[test]
    fn test_comments() {
        let netlist = parse("t\n* comment\nR1 in out 1k ; inline\n\n.end").unwrap();
        assert_eq!(netlist.components.len(), 1);
    }
}
