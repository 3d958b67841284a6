//! Operation identifiers.
//!
//! `operation_id("UserController", "findAllActive") == "userFindAllActive"`.
//!
//! The controller part is lower-cased with the first `controller` removed.
//! The method part loses its diacritics (`getCafé` → `getCafe`) and
//! apostrophes, is split into words, each word is capitalized and the words
//! are joined without separators. API clients generate method names
//! from these ids, so the rule must never change for existing routes.

/// Derive the operation id for a controller/handler pair.
pub fn operation_id(controller: &str, method: &str) -> String {
    let prefix = controller.to_lowercase().replacen("controller", "", 1);

    let mut id = prefix;
    for word in split_words(&deburr(method)) {
        capitalize_into(&word, &mut id);
    }
    id
}

fn capitalize_into(word: &str, out: &mut String) {
    let mut chars = word.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
        out.push_str(&chars.as_str().to_lowercase());
    }
}

/// Fold Latin-1 Supplement and Latin Extended-A letters to ASCII, drop
/// combining marks and apostrophes.
pub fn deburr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\'' | '\u{2019}' | '\u{0300}'..='\u{036f}' => {}
            _ => match fold_latin(c) {
                Some(ascii) => out.push_str(ascii),
                None => out.push(c),
            },
        }
    }
    out
}

fn fold_latin(c: char) -> Option<&'static str> {
    let folded = match c {
        'À'..='Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'à'..='å' | 'ā' | 'ă' | 'ą' => "a",
        'Æ' => "Ae",
        'æ' => "ae",
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => "C",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'Ð' | 'Ď' | 'Đ' => "D",
        'ð' | 'ď' | 'đ' => "d",
        'È'..='Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => "E",
        'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => "G",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'Ĥ' | 'Ħ' => "H",
        'ĥ' | 'ħ' => "h",
        'Ì'..='Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => "I",
        'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'Ĳ' => "IJ",
        'ĳ' => "ij",
        'Ĵ' => "J",
        'ĵ' => "j",
        'Ķ' => "K",
        'ķ' | 'ĸ' => "k",
        'Ĺ' | 'Ļ' | 'Ľ' | 'Ŀ' | 'Ł' => "L",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' | 'Ŋ' => "N",
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ŋ' => "n",
        'ŉ' => "n",
        'Ò'..='Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => "O",
        'ò'..='ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'Œ' => "Oe",
        'œ' => "oe",
        'Ŕ' | 'Ŗ' | 'Ř' => "R",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'Ś' | 'Ŝ' | 'Ş' | 'Š' => "S",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ſ' => "s",
        'ß' => "ss",
        'Ţ' | 'Ť' | 'Ŧ' => "T",
        'ţ' | 'ť' | 'ŧ' => "t",
        'Þ' => "Th",
        'þ' => "th",
        'Ù'..='Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => "U",
        'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'Ŵ' => "W",
        'ŵ' => "w",
        'Ý' | 'Ŷ' | 'Ÿ' => "Y",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Lower,
    Upper,
    Digit,
    Other,
}

fn classify(c: char) -> CharClass {
    if c.is_lowercase() {
        CharClass::Lower
    } else if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_numeric() {
        CharClass::Digit
    } else if c.is_alphanumeric() {
        // Letters without case (CJK and friends) behave like lower case.
        CharClass::Lower
    } else {
        CharClass::Other
    }
}

/// Split an identifier into words.
///
/// Boundaries:
/// - any non-alphanumeric character (dropped)
/// - lower case followed by upper case: `findAll` → `find`, `All`
/// - letters next to digits: `v2Users` → `v`, `2`, `Users`
/// - the last capital of an acronym run: `getHTTPStatus` → `get`, `HTTP`,
///   `Status`
pub fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<(char, CharClass)> = input.chars().map(|c| (c, classify(c))).collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (index, &(c, class)) in chars.iter().enumerate() {
        if class == CharClass::Other {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(&(_, prev)) = index.checked_sub(1).and_then(|i| chars.get(i)) {
            let next = chars.get(index + 1).map(|&(_, class)| class);
            let boundary = match (prev, class) {
                (CharClass::Lower, CharClass::Upper) => true,
                (CharClass::Digit, CharClass::Lower | CharClass::Upper) => true,
                (CharClass::Lower | CharClass::Upper, CharClass::Digit) => true,
                (CharClass::Upper, CharClass::Upper) => next == Some(CharClass::Lower),
                _ => false,
            };
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }

        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}
