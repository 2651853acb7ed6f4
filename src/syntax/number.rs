use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NumberError {
    #[error("Not a number: '{0}'")]
    Invalid(String),
    #[error("Number out of range: '{0}'")]
    OutOfRange(String),
}

/// Parses a numeric literal.
///
/// Hexadecimal `$7F` (up to `$FFFF`), binary `%0101` (up to one byte), decimal `48` and
/// character `'A'` (upper case letters only). All of them may be negated with a leading `-`.
pub fn parse_number(text: &str) -> Result<i64, NumberError> {
    let text = text.trim();
    let (digits, is_negative) = match text.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (text, false),
    };

    let invalid = || NumberError::Invalid(text.to_owned());

    let number = if let Some(hex) = digits.strip_prefix('$') {
        let number = i64::from_str_radix(hex, 16).map_err(|_| invalid())?;
        if !(0x0..=0xFFFF).contains(&number) {
            return Err(NumberError::OutOfRange(text.to_owned()));
        }
        number
    } else if let Some(binary) = digits.strip_prefix('%') {
        let number = i64::from_str_radix(binary, 2).map_err(|_| invalid())?;
        if !(0b0000_0000..=0b1111_1111).contains(&number) {
            return Err(NumberError::OutOfRange(text.to_owned()));
        }
        number
    } else if digits.starts_with('\'') {
        let inner = digits
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
            .ok_or_else(invalid)?;
        let mut chars = inner.chars();
        match (chars.next(), chars.next()) {
            (Some(ch @ 'A'..='Z'), None) => ch as i64,
            (Some(_), None) => return Err(NumberError::OutOfRange(text.to_owned())),
            _ => return Err(invalid()),
        }
    } else if !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()) {
        digits.parse::<i64>().map_err(|_| invalid())?
    } else {
        return Err(invalid());
    };

    Ok(if is_negative { -number } else { number })
}

/// How many bytes a literal occupies, judged by how it is written.
///
/// `$` literals take one byte per two hex digits and `%` literals one byte per eight bits, so
/// `$0020` is a word even though its value fits into a byte. Decimal literals take the fewest
/// bytes their value fits into. Quoted literals take one byte per character.
pub fn byte_length_of_number_string(text: &str) -> Result<usize, NumberError> {
    let text = text.trim();
    let value = text.strip_prefix(['-', '+']).unwrap_or(text);

    if let Some(binary) = value.strip_prefix('%') {
        Ok(binary.len().div_ceil(8).max(1))
    } else if let Some(hex) = value.strip_prefix('$') {
        Ok(hex.len().div_ceil(2).max(1))
    } else if let Some(quoted) = quoted_text(value) {
        Ok(quoted.chars().count())
    } else if !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit()) {
        let mut number: u64 = value
            .parse()
            .map_err(|_| NumberError::OutOfRange(text.to_owned()))?;
        let mut byte_count = 1;
        while number > 0xFF {
            number >>= 8;
            byte_count += 1;
        }
        Ok(byte_count)
    } else {
        Err(NumberError::Invalid(text.to_owned()))
    }
}

/// Content of a `'...'` or `"..."` literal.
pub fn quoted_text(text: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(&text[1..text.len() - 1]);
        }
    }
    None
}
