//! Selector parsing.

use super::{
    Combinator, ComplexSelector, CompoundSelector, SelectorError, SelectorList, SimpleSelector,
};

/// Cursor over one complex selector. Positions in errors are relative to
/// `source`, the full text handed to the public entry point.
struct Cursor<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    end: usize,
}

impl<'src> Cursor<'src> {
    fn new(source: &'src str, start: usize, end: usize) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            index: start,
            end,
        }
    }

    fn peek(&self) -> Option<u8> {
        if self.index < self.end {
            self.bytes.get(self.index).copied()
        } else {
            None
        }
    }

    fn bump(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    fn error(&self, reason: &'static str) -> SelectorError {
        SelectorError {
            selector: self.source.to_owned(),
            position: self.index,
            reason,
        }
    }

    /// Skip ASCII whitespace, returning whether any was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.index;
        while self.peek().is_some_and(|byte| byte.is_ascii_whitespace()) {
            self.bump();
        }
        self.index > start
    }

    fn ident(&mut self) -> Result<&'src str, SelectorError> {
        let start = self.index;
        while self.peek().is_some_and(is_ident_byte) {
            self.bump();
        }
        if self.index == start {
            return Err(self.error("expected an identifier"));
        }
        self.source
            .get(start..self.index)
            .ok_or_else(|| self.error("identifier is not valid UTF-8"))
    }

    fn complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        self.skip_whitespace();
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();
        loop {
            compounds.push(self.compound()?);
            let saw_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                None => break,
                Some(b'>') => Combinator::Child,
                Some(b'+') => Combinator::NextSibling,
                Some(b'~') => Combinator::SubsequentSibling,
                Some(_) if saw_whitespace => {
                    combinators.push(Combinator::Descendant);
                    continue;
                }
                Some(_) => return Err(self.error("unsupported selector syntax")),
            };
            self.bump();
            self.skip_whitespace();
            combinators.push(combinator);
        }

        let subject = compounds.pop().unwrap_or_default();
        let ancestry = combinators
            .into_iter()
            .rev()
            .zip(compounds.into_iter().rev())
            .collect();
        Ok(ComplexSelector { subject, ancestry })
    }

    fn compound(&mut self) -> Result<CompoundSelector, SelectorError> {
        let mut simples = Vec::new();
        while let Some(byte) = self.peek() {
            let simple = match byte {
                b'*' => {
                    self.bump();
                    SimpleSelector::Universal
                }
                b'.' => {
                    self.bump();
                    SimpleSelector::Class(self.ident()?.to_owned())
                }
                b'#' => {
                    self.bump();
                    SimpleSelector::Id(self.ident()?.to_owned())
                }
                b'[' => {
                    self.bump();
                    self.attribute()?
                }
                _ if is_ident_byte(byte) => {
                    if !simples.is_empty() {
                        return Err(self.error("type selector must come first"));
                    }
                    SimpleSelector::Type(self.ident()?.to_ascii_lowercase())
                }
                _ => break,
            };
            simples.push(simple);
        }
        if simples.is_empty() {
            return Err(self.error("expected a selector"));
        }
        Ok(CompoundSelector { simples })
    }

    fn attribute(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let value = if self.peek() == Some(b'=') {
            self.bump();
            self.skip_whitespace();
            let value = match self.peek() {
                Some(quote @ (b'"' | b'\'')) => self.quoted(quote)?,
                _ => self.ident()?.to_owned(),
            };
            self.skip_whitespace();
            Some(value)
        } else {
            None
        };
        if self.peek() != Some(b']') {
            return Err(self.error("expected ']'"));
        }
        self.bump();
        Ok(SimpleSelector::Attribute { name, value })
    }

    fn quoted(&mut self, quote: u8) -> Result<String, SelectorError> {
        self.bump();
        let start = self.index;
        while self.peek().is_some_and(|byte| byte != quote) {
            self.bump();
        }
        if self.peek().is_none() {
            return Err(self.error("unterminated string"));
        }
        let value = self
            .source
            .get(start..self.index)
            .ok_or_else(|| self.error("string is not valid UTF-8"))?
            .to_owned();
        self.bump();
        Ok(value)
    }
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || !byte.is_ascii()
}

/// Parse a single complex selector. Commas are rejected.
pub fn parse_complex(input: &str) -> Result<ComplexSelector, SelectorError> {
    let mut cursor = Cursor::new(input, 0, input.len());
    cursor.complex()
}

/// Parse a comma-separated selector list.
pub fn parse_list(input: &str) -> Result<SelectorList, SelectorError> {
    let mut selectors = Vec::new();
    for (start, end) in split_top_level(input) {
        let mut cursor = Cursor::new(input, start, end);
        selectors.push(cursor.complex()?);
    }
    Ok(SelectorList { selectors })
}

/// Byte ranges of the comma-separated parts, ignoring commas inside
/// attribute brackets and quotes.
fn split_top_level(input: &str) -> Vec<(usize, usize)> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_brackets = false;
    let mut quote: Option<u8> = None;
    for (index, byte) in input.bytes().enumerate() {
        match (quote, byte) {
            (Some(open), _) if byte == open => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(byte),
            (None, b'[') => in_brackets = true,
            (None, b']') => in_brackets = false,
            (None, b',') if !in_brackets => {
                parts.push((start, index));
                start = index.saturating_add(1);
            }
            _ => {}
        }
    }
    parts.push((start, input.len()));
    parts
}
