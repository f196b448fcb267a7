//! String object: an immutable sequence of Unicode code points with a
//! lazily-built UTF-8 byte cache.
//!
//! The code-point buffer and the UTF-8 cache are kept separate: operations
//! like length and indexing work in code points, while `%s` and disk/network
//! I/O need the UTF-8 encoding, and re-deriving it on every call would make
//! string-heavy programs quadratic.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::exceptions::RunResult;
use crate::utf8;

#[derive(Debug)]
pub struct StringObj {
    codepoints: Vec<char>,
    utf8_cache: RefCell<Option<Rc<[u8]>>>,
}

impl StringObj {
    /// Builds from an owned code-point buffer without copying.
    #[must_use]
    pub fn from_codepoints(codepoints: Vec<char>) -> Self {
        Self {
            codepoints,
            utf8_cache: RefCell::new(None),
        }
    }

    /// Builds from borrowed code points, copying them.
    #[must_use]
    pub fn from_codepoints_ref(codepoints: &[char]) -> Self {
        Self::from_codepoints(codepoints.to_vec())
    }

    /// Decodes UTF-8 input into a string object.
    ///
    /// # Errors
    /// Propagates `utf8::decode`'s `value-error` for malformed input.
    pub fn from_utf8(bytes: &[u8]) -> RunResult<Self> {
        let codepoints = utf8::decode(bytes)?;
        Ok(Self::from_codepoints(codepoints))
    }

    #[must_use]
    pub fn codepoints(&self) -> &[char] {
        &self.codepoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codepoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codepoints.is_empty()
    }

    /// Returns the cached UTF-8 encoding, building and caching it on first use.
    ///
    /// # Errors
    /// Propagates `utf8::encode`'s `value-error`, which in practice cannot
    /// trigger here since `char` already excludes surrogates and
    /// out-of-range scalars.
    pub fn as_utf8(&self) -> RunResult<Rc<[u8]>> {
        if let Some(cached) = self.utf8_cache.borrow().as_ref() {
            return Ok(Rc::clone(cached));
        }
        let bytes: Rc<[u8]> = utf8::encode(&self.codepoints)?.into();
        *self.utf8_cache.borrow_mut() = Some(Rc::clone(&bytes));
        Ok(bytes)
    }

    /// Concatenates many strings in one allocation.
    #[must_use]
    pub fn join(parts: &[&Self]) -> Self {
        let total: usize = parts.iter().map(|p| p.codepoints.len()).sum();
        let mut out = Vec::with_capacity(total);
        for part in parts {
            out.extend_from_slice(&part.codepoints);
        }
        Self::from_codepoints(out)
    }

    #[must_use]
    pub fn codepoints_equal(&self, other: &Self) -> bool {
        self.codepoints == other.codepoints
    }
}

/// A single `%`-directive argument accepted by [`format`].
#[derive(Debug)]
pub enum FormatArg<'a> {
    /// `%s`: a NUL-terminated UTF-8 C string.
    CStr(&'a str),
    /// `%S`: a string object.
    Str(&'a StringObj),
    /// `%d`: a signed decimal integer.
    Int(i64),
    /// `%zu`: an unsigned decimal size.
    Size(usize),
    /// `%U`: a code point.
    CodePoint(char),
    /// `%B`: a single byte.
    Byte(u8),
}

/// Renders a printf-like template against positional arguments.
///
/// Recognizes exactly these directives: `%s`, `%S`, `%d`, `%zu`, `%U`, `%B`,
/// `%%`. Any other directive is a programmer error
/// and panics rather than silently misrendering — this formatter is only
/// ever driven by interpreter-internal diagnostic strings, never by asda
/// source text.
///
/// # Panics
/// Panics if `template` contains an unrecognized directive, or if there are
/// fewer arguments than directives.
#[must_use]
pub fn format(template: &str, args: &[FormatArg<'_>]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next().expect("format: dangling '%' at end of template") {
            '%' => out.push('%'),
            's' => match args.next().expect("format: missing argument for %s") {
                FormatArg::CStr(s) => out.push_str(s),
                other => panic!("format: %s argument mismatch: {other:?}"),
            },
            'S' => match args.next().expect("format: missing argument for %S") {
                FormatArg::Str(s) => {
                    for c in s.codepoints() {
                        out.push(*c);
                    }
                }
                other => panic!("format: %S argument mismatch: {other:?}"),
            },
            'd' => match args.next().expect("format: missing argument for %d") {
                FormatArg::Int(n) => {
                    let _ = write!(out, "{n}");
                }
                other => panic!("format: %d argument mismatch: {other:?}"),
            },
            'z' => {
                assert!(
                    chars.next() == Some('u'),
                    "format: unrecognized directive starting with %z"
                );
                match args.next().expect("format: missing argument for %zu") {
                    FormatArg::Size(n) => {
                        let _ = write!(out, "{n}");
                    }
                    other => panic!("format: %zu argument mismatch: {other:?}"),
                }
            }
            'U' => match args.next().expect("format: missing argument for %U") {
                FormatArg::CodePoint(c) => {
                    let _ = write!(out, "U+{:04X}", *c as u32);
                    if c.is_ascii_graphic() || *c == ' ' {
                        let _ = write!(out, " '{c}'");
                    }
                }
                other => panic!("format: %U argument mismatch: {other:?}"),
            },
            'B' => match args.next().expect("format: missing argument for %B") {
                FormatArg::Byte(b) => {
                    let _ = write!(out, "0x{b:02x}");
                    if b.is_ascii_graphic() || *b == b' ' {
                        let _ = write!(out, " '{}'", *b as char);
                    }
                }
                other => panic!("format: %B argument mismatch: {other:?}"),
            },
            other => panic!("format: unrecognized directive %{other}"),
        }
    }
    out
}
