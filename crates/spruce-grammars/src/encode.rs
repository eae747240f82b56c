use spruce_lr::table::encode;

/// Writes `values` in the compact string form read by [`spruce_lr::decode_array`].
pub fn encode_array(values: &[u32]) -> String {
    let mut text = String::new();
    encode_value(values.len() as u32, &mut text);
    for &value in values {
        encode_value(value, &mut text);
    }
    text
}

fn encode_value(mut value: u32, out: &mut String) {
    if value == encode::BIG_VAL {
        out.push(char::from(encode::BIG_VAL_CODE as u8));
        return;
    }
    // Digits come out least significant first, the last one carries the stop marker.
    let mut digits = Vec::new();
    let mut first = encode::BASE;
    loop {
        let low = value % encode::BASE;
        digits.push(digit_char(low + first));
        first = 0;
        value /= encode::BASE;
        if value == 0 {
            break;
        }
    }
    out.extend(digits.into_iter().rev());
}

fn digit_char(digit: u32) -> char {
    let mut code = digit + encode::START;
    if code >= encode::GAP1 {
        code += 1;
    }
    if code >= encode::GAP2 {
        code += 1;
    }
    char::from_u32(code).unwrap_or('~')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_back() {
        let values = [0, 1, 45, 46, 91, 2116, 0xfffe, 0xffff, 0x12345, 7];
        let text = encode_array(&values);
        assert!(!text.contains('"') && !text.contains('\\'), "{text}");
        assert_eq!(spruce_lr::decode_array(&text).unwrap(), values);
    }
}
