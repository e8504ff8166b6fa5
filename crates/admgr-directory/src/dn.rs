//! Distinguished names.
//!
//! Entries are addressed by DNs such as `CN=Smith\, John,OU=Staff,DC=example,DC=com`. The parser
//! accepts RFC 4514 syntax including `\XX` hex escapes, multi-valued RDNs joined with `+` and
//! surrounding whitespace. Parsed names are kept in a canonical string form so they can be handed
//! straight back to the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};
use thiserror::Error;

use admgr_core::error::Error as CoreError;

/// Reasons a distinguished name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// Nothing to parse.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component has no `=` or contains characters not allowed in an attribute type.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component has nothing before its `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component has nothing after its `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// A backslash at the very end of the input.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// A `\X` escape whose second character is not a hex digit, or hex escapes that do not form
    /// UTF-8.
    #[error("invalid escape sequence in distinguished name: {0}")]
    InvalidEscape(String),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidDn(err.to_string())
    }
}

/// One `attribute=value` assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    attribute: String,
    value: String,
}

impl AttributeValue {
    /// Attribute type as written, e.g. `CN`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Attribute types compare case-insensitively.
    #[must_use]
    pub fn is(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.attribute)?;
        f.write_str("=")?;
        write_escaped(f, &self.value)
    }
}

/// A relative distinguished name: one or more assertions joined with `+`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    assertions: Vec<AttributeValue>,
}

impl RelativeDistinguishedName {
    /// Single-valued RDN `attribute=value`.
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            assertions: vec![AttributeValue {
                attribute: attribute.into(),
                value: value.into(),
            }],
        }
    }

    /// All assertions, in written order.
    #[must_use]
    pub fn assertions(&self) -> &[AttributeValue] {
        &self.assertions
    }

    /// Attribute type of the first assertion.
    #[must_use]
    pub fn attribute(&self) -> &str {
        self.assertions.first().map_or("", AttributeValue::attribute)
    }

    /// Value of the first assertion.
    #[must_use]
    pub fn value(&self) -> &str {
        self.assertions.first().map_or("", AttributeValue::value)
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, assertion) in self.assertions.iter().enumerate() {
            if index > 0 {
                f.write_str("+")?;
            }
            write!(f, "{assertion}")?;
        }
        Ok(())
    }
}

/// A parsed distinguished name, leading RDN first.
///
/// Equality compares the canonical text, so `CN=a` and `cn=a` differ. Directory servers treat
/// attribute types case-insensitively; compare lowercased text where that matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    text: String,
    rdns: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses `input`.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] describing the first malformed component.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }
        Ok(Self::from_rdns(parse_rdns(input)?))
    }

    fn from_rdns(rdns: Vec<RelativeDistinguishedName>) -> Self {
        let text = rdns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self { text, rdns }
    }

    /// Canonical text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// RDNs, leading RDN first.
    #[must_use]
    pub fn rdns(&self) -> &[RelativeDistinguishedName] {
        &self.rdns
    }

    /// Every assertion of every RDN, leading RDN first.
    pub fn assertions(&self) -> impl Iterator<Item = &AttributeValue> + '_ {
        self.rdns.iter().flat_map(|rdn| rdn.assertions.iter())
    }

    /// The entry's own name within its parent, e.g. `cn=jdoe`.
    #[must_use]
    pub fn leading_rdn(&self) -> Option<&RelativeDistinguishedName> {
        self.rdns.first()
    }

    /// The containing entry, or `None` for a single-RDN name.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.rdns.len() > 1).then(|| Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// First value of `attribute` anywhere in the name.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.assertions()
            .find(|assertion| assertion.is(attribute))
            .map(AttributeValue::value)
    }

    /// DNS domain spelled by the `dc=` components, lowercased and dot-joined.
    ///
    /// `cn=jdoe,ou=Users,DC=Example,DC=com` yields `example.com`; a name without `dc=`
    /// components yields an empty string.
    #[must_use]
    pub fn domain(&self) -> String {
        self.assertions()
            .filter(|assertion| assertion.is("dc"))
            .map(|assertion| assertion.value().to_lowercase())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Name of the entry `attribute=value` directly below this one.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(RelativeDistinguishedName::new(attribute, value));
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// This name with its leading RDN replaced by `rdn`.
    #[must_use]
    pub fn renamed(&self, rdn: RelativeDistinguishedName) -> Self {
        let mut rdns = self.rdns.clone();
        match rdns.first_mut() {
            Some(leading) => *leading = rdn,
            None => rdns.push(rdn),
        }
        Self::from_rdns(rdns)
    }

    /// Where this entry ends up when moved below `container`.
    #[must_use]
    pub fn moved_to(&self, container: &Self) -> Self {
        let mut rdns: Vec<_> = self.rdns.iter().take(1).cloned().collect();
        rdns.extend(container.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }
}

/// Domain of a DN given as text; see [`DistinguishedName::domain`].
///
/// # Errors
///
/// Returns [`DistinguishedNameError`] if `dn` does not parse.
pub fn domain_from_dn(dn: &str) -> std::result::Result<String, DistinguishedNameError> {
    DistinguishedName::parse(dn).map(|dn| dn.domain())
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.text
    }
}

type Input<'a> = Peekable<Chars<'a>>;
type ParseResult<T> = std::result::Result<T, DistinguishedNameError>;

fn parse_rdns(input: &str) -> ParseResult<Vec<RelativeDistinguishedName>> {
    let mut chars = input.chars().peekable();
    let mut rdns = Vec::new();
    let mut assertions = Vec::new();

    loop {
        let attribute = read_attribute(&mut chars)?;
        let (value, separator) = read_value(&mut chars)?;
        if value.is_empty() {
            return Err(DistinguishedNameError::MissingValue(attribute));
        }
        assertions.push(AttributeValue { attribute, value });

        match separator {
            Some('+') => {}
            Some(_) => rdns.push(RelativeDistinguishedName {
                assertions: std::mem::take(&mut assertions),
            }),
            None => {
                rdns.push(RelativeDistinguishedName { assertions });
                return Ok(rdns);
            }
        }
    }
}

fn read_attribute(chars: &mut Input<'_>) -> ParseResult<String> {
    let mut attribute = String::new();
    loop {
        match chars.next() {
            Some('=') => break,
            Some(ch @ (',' | '+' | ';')) => {
                attribute.push(ch);
                return Err(DistinguishedNameError::InvalidComponent(attribute));
            }
            Some(ch) => attribute.push(ch),
            None => return Err(DistinguishedNameError::InvalidComponent(attribute)),
        }
    }

    let attribute = attribute.trim();
    if attribute.is_empty() {
        let rest: String = chars.clone().take_while(|ch| *ch != ',').collect();
        return Err(DistinguishedNameError::MissingAttribute(format!("={rest}")));
    }
    let valid = attribute
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.');
    if !valid {
        return Err(DistinguishedNameError::InvalidComponent(attribute.to_string()));
    }
    Ok(attribute.to_string())
}

/// Reads an unescaped value up to the next unescaped `,`, `;` or `+`, returning that separator.
fn read_value(chars: &mut Input<'_>) -> ParseResult<(String, Option<char>)> {
    while chars.next_if_eq(&' ').is_some() {}

    let mut bytes = Vec::new();
    // Unescaped trailing spaces are not part of the value.
    let mut significant = 0;
    let mut separator = None;

    while let Some(ch) = chars.next() {
        match ch {
            ',' | ';' | '+' => {
                separator = Some(ch);
                break;
            }
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or(DistinguishedNameError::UnterminatedEscape)?;
                if escaped.is_ascii_hexdigit() {
                    bytes.push(read_hex_pair(chars, escaped)?);
                } else {
                    push_char(&mut bytes, escaped);
                }
                significant = bytes.len();
            }
            ' ' => bytes.push(b' '),
            _ => {
                push_char(&mut bytes, ch);
                significant = bytes.len();
            }
        }
    }

    bytes.truncate(significant);
    let value = String::from_utf8(bytes).map_err(|err| {
        DistinguishedNameError::InvalidEscape(String::from_utf8_lossy(err.as_bytes()).into_owned())
    })?;
    Ok((value, separator))
}

fn read_hex_pair(chars: &mut Input<'_>, high: char) -> ParseResult<u8> {
    let low = chars
        .next()
        .filter(char::is_ascii_hexdigit)
        .ok_or_else(|| DistinguishedNameError::InvalidEscape(format!("\\{high}")))?;
    let pair: String = [high, low].iter().collect();
    u8::from_str_radix(&pair, 16).map_err(|_| DistinguishedNameError::InvalidEscape(format!("\\{pair}")))
}

fn push_char(bytes: &mut Vec<u8>, ch: char) {
    let mut buffer = [0; 4];
    bytes.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let last = value.chars().count().saturating_sub(1);
    for (index, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => write!(f, "\\{ch}")?,
            '\0' => f.write_str("\\00")?,
            ' ' if index == 0 || index == last => f.write_str("\\ ")?,
            '#' if index == 0 => f.write_str("\\#")?,
            _ => write!(f, "{ch}")?,
        }
    }
    Ok(())
}
