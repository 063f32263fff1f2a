use crate::nameserver::zones::errors::*;
use crate::nameserver::zones::tokens::*;
use crate::shared::dns;

/// Parse the TTL and [`dns::class`] from one of the following formats: \[ttl] \[class]
/// or \[class] \[ttl], both optionals. It consumes only the tokens strictly needed,
/// leaving untouched the next ones (the record type).
pub fn parse_ttl_class(tokenizer: &mut Tokenizer) -> Result<(Option<u32>, Option<dns::Class>), ParseErr> {
    let next_token = tokenizer.peek_after_blanks()?;

    // Try the ttl [class] format.
    if let Token::Number(n) = next_token {
        tokenizer.next().unwrap(); // discard the peeked token
        let class_or_type = tokenizer.peek_after_blanks()?;
        return if let Ok(class) = try_to_class(&class_or_type) {
            tokenizer.next().unwrap();
            Ok((Some(n), Some(class)))
        } else {
            Ok((Some(n), None))
        };
    }

    // Try the class [ttl] format. We expect a string in any case since
    // even if we don't have the class we should find the record type.
    let class_or_type = match next_token {
        Token::String(s) => s,
        _ => return Err(ParseErr::UnexpectedToken(next_token)),
    };

    if let Ok(class) = dns::Class::from_string(&class_or_type) {
        tokenizer.next().unwrap();
        let ttl_or_type = tokenizer.peek_after_blanks()?;
        return if let Ok(ttl) = try_to_ttl(&ttl_or_type) {
            tokenizer.next().unwrap();
            Ok((Some(ttl), Some(class)))
        } else {
            Ok((None, Some(class)))
        };
    }

    // No class, no TTL.
    Ok((None, None))
}

fn try_to_ttl(token: &Token) -> Result<u32, ()> {
    if let Token::Number(n) = token {
        Ok(*n)
    } else {
        Err(())
    }
}

fn try_to_class(token: &Token) -> Result<dns::Class, ()> {
    if let Token::String(s) = token {
        return match dns::Class::from_string(s) {
            Err(_) => Err(()),
            Ok(v) => Ok(v),
        };
    }
    Err(())
}

/// Replace "@" with the current origin, or return the absolute form
/// oth the passed name. The name is also validated.
pub fn adjust_name(current_origin: &dns::Name, name: &mut String) -> Result<dns::Name, ParseErr> {
    if name == "@" {
        return Ok(current_origin.clone());
    }
    if !name.ends_with('.') {
        name.push('.');
        name.push_str(current_origin.as_ref());
    }
    match dns::Name::from_string(name) {
        Ok(name) => Ok(name),
        Err(err) => Err(err)?,
    }
}

/// Parse a `$TTL` duration literal: a bare integer of seconds, or an integer
/// followed by a unit suffix (`s`/`m`/`h`/`d`/`w`).
pub fn parse_duration(literal: &str) -> Result<u32, ParseErr> {
    let (digits, multiplier) = match literal.chars().last() {
        Some('s') => (&literal[..literal.len() - 1], 1),
        Some('m') => (&literal[..literal.len() - 1], 60),
        Some('h') => (&literal[..literal.len() - 1], 60 * 60),
        Some('d') => (&literal[..literal.len() - 1], 24 * 60 * 60),
        Some('w') => (&literal[..literal.len() - 1], 7 * 24 * 60 * 60),
        _ => (literal, 1),
    };
    let value: u32 = digits.parse().map_err(|_| ParseErr::MalformedData(literal.to_string()))?;
    value.checked_mul(multiplier).ok_or_else(|| ParseErr::MalformedData(literal.to_string()))
}
