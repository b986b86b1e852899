//! Pattern match data and final fast-pattern selection.
//!
//! A rule's content and regex conditions carry a [`PatternMatchData`]. When a
//! pattern is chosen as a rule's fast pattern, [`select_fast_pattern`]
//! derives the exact bytes the search engine receives: the author-designated
//! sub-range if one was given, then the configured length cap.

use crate::rules::OptionId;

/// Search contexts a pattern can be anchored to. Each engine group keeps one
/// engine per buffer type that actually received patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// Raw packet payload.
    Packet,
    /// Normalized protocol header.
    Header,
    /// Normalized message body.
    Body,
    /// Extracted key material (URIs, names).
    Key,
    /// Reassembled file content.
    File,
}

impl BufferType {
    pub const COUNT: usize = 5;

    pub const ALL: [BufferType; BufferType::COUNT] = [
        BufferType::Packet,
        BufferType::Header,
        BufferType::Body,
        BufferType::Key,
        BufferType::File,
    ];

    /// Stable index into per-buffer arrays.
    pub fn index(self) -> usize {
        match self {
            BufferType::Packet => 0,
            BufferType::Header => 1,
            BufferType::Body => 2,
            BufferType::Key => 3,
            BufferType::File => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferType::Packet => "packet",
            BufferType::Header => "header",
            BufferType::Body => "body",
            BufferType::Key => "key",
            BufferType::File => "file",
        }
    }
}

/// Byte-pattern payload of one content or regex condition.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatchData {
    pub pattern: Vec<u8>,
    /// Case-insensitive match.
    pub no_case: bool,
    /// Condition requires the pattern to be absent.
    pub negated: bool,
    /// Plain bytes as opposed to a regex.
    pub literal: bool,
    /// Author-designated fast-pattern sub-range offset.
    pub fp_offset: u32,
    /// Sub-range length; `0` means from the offset to the end.
    pub fp_length: u32,
    /// The rule author designated this pattern as the fast pattern.
    pub user_fast_pattern: bool,
    /// Buffer the pattern searches in.
    pub buffer: BufferType,
    /// Opaque evaluator flags carried through to the runtime.
    pub flags: u32,
    /// OR-equivalent byte forms inserted alongside the main pattern. These
    /// reference interned `Pattern` options that appear in no condition
    /// chain.
    pub alternates: Vec<OptionId>,
}

impl PatternMatchData {
    /// A plain literal content pattern.
    pub fn literal(pattern: &[u8], buffer: BufferType) -> Self {
        Self {
            pattern: pattern.to_vec(),
            no_case: false,
            negated: false,
            literal: true,
            fp_offset: 0,
            fp_length: 0,
            user_fast_pattern: false,
            buffer,
            flags: 0,
            alternates: Vec::new(),
        }
    }

    /// A regex pattern; only regex-capable engines may host it.
    pub fn regex(pattern: &[u8], buffer: BufferType) -> Self {
        Self {
            literal: false,
            ..Self::literal(pattern, buffer)
        }
    }

    pub fn with_no_case(mut self) -> Self {
        self.no_case = true;
        self
    }

    pub fn with_negated(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn with_fast_pattern(mut self) -> Self {
        self.user_fast_pattern = true;
        self
    }

    /// Designate the pattern as fast pattern and restrict it to a sub-range.
    pub fn with_fast_pattern_range(mut self, offset: u32, length: u32) -> Self {
        self.user_fast_pattern = true;
        self.fp_offset = offset;
        self.fp_length = length;
        self
    }

    fn has_sub_range(&self) -> bool {
        self.user_fast_pattern && (self.fp_offset != 0 || self.fp_length != 0)
    }
}

/// Bytes actually handed to a search engine for one fast pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalPattern<'a> {
    pub bytes: &'a [u8],
    /// The configured length cap shortened the pattern.
    pub truncated: bool,
}

/// Derive the final fast-pattern bytes for `pmd`.
///
/// Negated and non-literal patterns go to the engine unmodified; slicing a
/// pattern that must be absent, or a regex, would change its meaning. For
/// literal positives the author's sub-range applies first when it fits inside
/// the pattern, then `max_pattern_len` caps the result (`0` = unbounded).
/// The `truncated` flag reports only the cap, not the sub-range.
pub fn select_fast_pattern(pmd: &PatternMatchData, max_pattern_len: usize) -> FinalPattern<'_> {
    if pmd.negated || !pmd.literal {
        return FinalPattern {
            bytes: &pmd.pattern,
            truncated: false,
        };
    }

    let mut bytes: &[u8] = &pmd.pattern;
    if pmd.has_sub_range() {
        let offset = pmd.fp_offset as usize;
        let length = if pmd.fp_length == 0 {
            bytes.len().saturating_sub(offset)
        } else {
            pmd.fp_length as usize
        };
        if length > 0 && offset + length <= bytes.len() {
            bytes = &bytes[offset..offset + length];
        }
    }

    let truncated = max_pattern_len != 0 && bytes.len() > max_pattern_len;
    if truncated {
        bytes = &bytes[..max_pattern_len];
    }

    FinalPattern { bytes, truncated }
}

/// Printable rendering of pattern bytes for diagnostics. Non-printable
/// bytes appear as `\xNN`.
pub fn pattern_preview(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}
