//! Content safety: escaping and illegal-sequence repair
//!
//! Every function scans its input once, handing runs of characters that need
//! no treatment to [`XmlOutput::write_raw`] in one piece and writing entity or
//! character references in between.

use super::{EscapeSettings, XmlOutput};
use crate::error::{Result, XmlWriteError};
use crate::types::InvalidCharPolicy;

/// What to do with one character
enum Action {
    /// Predefined entity
    Entity(&'static str),
    /// `&#x..;` reference
    CharRef,
    /// Substitute character
    Replace(char),
}

/// Characters XML never allows literally: C0 controls other than tab, newline
/// and CR, plus U+FFFE and U+FFFF.
#[inline]
fn is_forbidden(ch: char) -> bool {
    let cp = ch as u32;
    (cp < 0x20 && !matches!(ch, '\t' | '\n' | '\r')) || cp == 0xFFFE || cp == 0xFFFF
}

/// XML 1.1 restricted characters, which must be written as references
#[inline]
fn is_restricted_1_1(ch: char) -> bool {
    matches!(ch as u32, 0x7F..=0x84 | 0x86..=0x9F)
}

/// Treatment of a forbidden character in a context that accepts references
fn forbidden_action(ch: char, settings: &EscapeSettings, context: &'static str) -> Result<Action> {
    let cp = ch as u32;
    // XML 1.1 accepts references to C0 controls; nothing accepts NUL
    if settings.xml_version.is_1_1() && cp != 0 && cp < 0x20 {
        return Ok(Action::CharRef);
    }
    match settings.invalid_chars {
        InvalidCharPolicy::Fail => Err(XmlWriteError::InvalidChar {
            code_point: cp,
            context,
        }),
        InvalidCharPolicy::Escape if cp != 0 => Ok(Action::CharRef),
        InvalidCharPolicy::Escape => Err(XmlWriteError::InvalidChar {
            code_point: cp,
            context,
        }),
        InvalidCharPolicy::Replace(r) => Ok(Action::Replace(r)),
    }
}

/// Treatment of a character above the encoding ceiling where references are legal
fn unencodable_action<O: XmlOutput + ?Sized>(out: &O, ch: char) -> Result<Action> {
    match out.settings().unencodable {
        crate::types::UnencodablePolicy::Escape => Ok(Action::CharRef),
        crate::types::UnencodablePolicy::Fail => Err(unencodable(out, ch)),
    }
}

fn unencodable<O: XmlOutput + ?Sized>(out: &O, ch: char) -> XmlWriteError {
    XmlWriteError::Unencodable {
        code_point: ch as u32,
        encoding: out.encoding().name().to_string(),
    }
}

/// Character allowed in literal-only constructs (comments, PIs, names)?
/// Returns a replacement when the policy substitutes one.
fn literal_only_char<O: XmlOutput + ?Sized>(
    out: &O,
    ch: char,
    context: &'static str,
) -> Result<Option<char>> {
    let settings = out.settings();
    let bad = is_forbidden(ch) || (settings.xml_version.is_1_1() && is_restricted_1_1(ch));
    if bad {
        return match settings.invalid_chars {
            InvalidCharPolicy::Replace(r) => Ok(Some(r)),
            _ => Err(XmlWriteError::InvalidChar {
                code_point: ch as u32,
                context,
            }),
        };
    }
    if ch as u32 > out.max_code_point() {
        return Err(unencodable(out, ch));
    }
    Ok(None)
}

fn apply<O: XmlOutput + ?Sized>(out: &mut O, action: Action, ch: char) -> Result<()> {
    match action {
        Action::Entity(entity) => out.write_raw(entity),
        Action::CharRef => write_char_ref(out, ch as u32),
        Action::Replace(r) => {
            if r as u32 > out.max_code_point() {
                write_char_ref(out, r as u32)
            } else {
                let mut tmp = [0u8; 4];
                out.write_raw(r.encode_utf8(&mut tmp))
            }
        }
    }
}

/// Write `&#x<HEX>;` with the shortest uppercase hex form
pub fn write_char_ref<O: XmlOutput + ?Sized>(out: &mut O, code_point: u32) -> Result<()> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut buf = [0u8; 12];
    let mut pos = buf.len();
    buf[pos - 1] = b';';
    pos -= 1;
    let mut v = code_point;
    loop {
        pos -= 1;
        buf[pos] = HEX[(v & 0xF) as usize];
        v >>= 4;
        if v == 0 {
            break;
        }
    }
    pos -= 3;
    buf[pos..pos + 3].copy_from_slice(b"&#x");
    // Only ASCII was written into the buffer
    let s = std::str::from_utf8(&buf[pos..]).unwrap_or("&#xFFFD;");
    out.write_raw(s)
}

/// Length of the `]` run ending the output once `text` follows output that
/// ended in `run` of them
pub(crate) fn bracket_run_after(run: usize, text: &str) -> usize {
    let tail = text.len() - text.trim_end_matches(']').len();
    if tail == text.len() {
        run.saturating_add(tail)
    } else {
        tail
    }
}

/// Escape character data.
///
/// `<` and `&` always, `>` only after `]]` (including a `]]` that ended the
/// previous write), `\r` when CR preservation is on, forbidden and
/// unencodable characters per policy.
pub fn write_text<O: XmlOutput + ?Sized>(out: &mut O, text: &str) -> Result<()> {
    let settings = *out.settings();
    let ceiling = out.max_code_point();
    let mut start = 0;
    let mut brackets = out.trailing_brackets();

    for (i, ch) in text.char_indices() {
        let after_brackets = brackets >= 2;
        brackets = if ch == ']' { brackets.saturating_add(1) } else { 0 };
        let action = match ch {
            '<' => Action::Entity("&lt;"),
            '&' => Action::Entity("&amp;"),
            '>' if after_brackets => Action::Entity("&gt;"),
            '\r' if settings.escape_cr => Action::CharRef,
            '\t' | '\n' | '\r' => continue,
            c if is_forbidden(c) => forbidden_action(c, &settings, "text")?,
            c if settings.xml_version.is_1_1() && is_restricted_1_1(c) => Action::CharRef,
            c if c as u32 > ceiling => unencodable_action(&*out, c)?,
            _ => continue,
        };
        if start < i {
            out.write_raw(&text[start..i])?;
        }
        apply(out, action, ch)?;
        start = i + ch.len_utf8();
    }
    if start < text.len() {
        out.write_raw(&text[start..])?;
    }
    Ok(())
}

/// Escape an attribute value.
///
/// Like text, plus the active quote character; tab, newline and CR are always
/// written as references so attribute-value normalization keeps them.
pub fn write_attr_value<O: XmlOutput + ?Sized>(out: &mut O, value: &str) -> Result<()> {
    let settings = *out.settings();
    let ceiling = out.max_code_point();
    let quote = settings.quote.as_char();
    let mut start = 0;

    for (i, ch) in value.char_indices() {
        let action = match ch {
            '<' => Action::Entity("&lt;"),
            '&' => Action::Entity("&amp;"),
            c if c == quote => Action::Entity(settings.quote.entity()),
            '\t' | '\n' | '\r' => Action::CharRef,
            c if is_forbidden(c) => forbidden_action(c, &settings, "attribute value")?,
            c if settings.xml_version.is_1_1() && is_restricted_1_1(c) => Action::CharRef,
            c if c as u32 > ceiling => unencodable_action(&*out, c)?,
            _ => continue,
        };
        if start < i {
            out.write_raw(&value[start..i])?;
        }
        apply(out, action, ch)?;
        start = i + ch.len_utf8();
    }
    if start < value.len() {
        out.write_raw(&value[start..])?;
    }
    Ok(())
}

/// Write pre-escaped text, only replacing characters the encoding cannot hold
pub fn write_encoded<O: XmlOutput + ?Sized>(out: &mut O, text: &str) -> Result<()> {
    let ceiling = out.max_code_point();
    if ceiling >= 0x10_FFFF || text.is_ascii() {
        return out.write_raw(text);
    }
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if ch as u32 <= ceiling {
            continue;
        }
        let action = unencodable_action(&*out, ch)?;
        if start < i {
            out.write_raw(&text[start..i])?;
        }
        apply(out, action, ch)?;
        start = i + ch.len_utf8();
    }
    if start < text.len() {
        out.write_raw(&text[start..])?;
    }
    Ok(())
}

/// Write a CDATA section.
///
/// With content fixing on, `]]>` splits the section between `]]` and `>`;
/// otherwise its offset is returned. Characters that cannot appear literally
/// are written as references between two sections.
pub fn write_cdata<O: XmlOutput + ?Sized>(out: &mut O, data: &str) -> Result<Option<usize>> {
    let settings = *out.settings();
    if !settings.fix_content {
        if let Some(offset) = data.find("]]>") {
            return Ok(Some(offset));
        }
    }
    let ceiling = out.max_code_point();

    out.write_raw("<![CDATA[")?;
    let mut start = 0;
    for (i, ch) in data.char_indices() {
        if ch == '>' && data[..i].ends_with("]]") {
            out.write_raw(&data[start..i])?;
            out.write_raw("]]><![CDATA[")?;
            start = i;
            continue;
        }
        let action = match ch {
            '\r' if settings.escape_cr => Action::CharRef,
            '\t' | '\n' | '\r' => continue,
            c if is_forbidden(c) => forbidden_action(c, &settings, "CDATA")?,
            c if settings.xml_version.is_1_1() && is_restricted_1_1(c) => Action::CharRef,
            c if c as u32 > ceiling => unencodable_action(&*out, c)?,
            _ => continue,
        };
        if start < i {
            out.write_raw(&data[start..i])?;
        }
        match action {
            Action::Replace(_) => apply(out, action, ch)?,
            _ => {
                out.write_raw("]]>")?;
                apply(out, action, ch)?;
                out.write_raw("<![CDATA[")?;
            }
        }
        start = i + ch.len_utf8();
    }
    if start < data.len() {
        out.write_raw(&data[start..])?;
    }
    out.write_raw("]]>")?;
    Ok(None)
}

/// Write a comment.
///
/// With content fixing on, a space goes between every two adjacent hyphens
/// and after a trailing hyphen; otherwise the offset of the first `--` (or of
/// the trailing `-`) is returned.
pub fn write_comment<O: XmlOutput + ?Sized>(out: &mut O, data: &str) -> Result<Option<usize>> {
    if !out.settings().fix_content {
        if let Some(offset) = data.find("--") {
            return Ok(Some(offset));
        }
        if data.ends_with('-') {
            return Ok(Some(data.len() - 1));
        }
    }

    out.write_raw("<!--")?;
    let mut start = 0;
    let mut prev_hyphen = false;
    for (i, ch) in data.char_indices() {
        if ch == '-' {
            if prev_hyphen {
                out.write_raw(&data[start..i])?;
                out.write_raw(" ")?;
                start = i;
            }
            prev_hyphen = true;
            continue;
        }
        prev_hyphen = false;
        if let Some(r) = literal_only_char(&*out, ch, "comment")? {
            out.write_raw(&data[start..i])?;
            apply(out, Action::Replace(r), ch)?;
            start = i + ch.len_utf8();
        }
    }
    if start < data.len() {
        out.write_raw(&data[start..])?;
    }
    if prev_hyphen {
        out.write_raw(" ")?;
    }
    out.write_raw("-->")?;
    Ok(None)
}

/// Write a processing instruction. `?>` inside the data cannot be repaired
/// and always yields its offset.
pub fn write_pi<O: XmlOutput + ?Sized>(
    out: &mut O,
    target: &str,
    data: &str,
) -> Result<Option<usize>> {
    if let Some(offset) = data.find("?>") {
        return Ok(Some(offset));
    }

    out.write_raw("<?")?;
    out.write_raw(target)?;
    if !data.is_empty() {
        out.write_raw(" ")?;
        let mut start = 0;
        for (i, ch) in data.char_indices() {
            if let Some(r) = literal_only_char(&*out, ch, "processing instruction")? {
                out.write_raw(&data[start..i])?;
                apply(out, Action::Replace(r), ch)?;
                start = i + ch.len_utf8();
            }
        }
        if start < data.len() {
            out.write_raw(&data[start..])?;
        }
    }
    out.write_raw("?>")?;
    Ok(None)
}
