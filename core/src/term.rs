use std::cmp::Ordering;

/// Leading-character class of a term. Decides its bucket, its sort group and
/// whether its casing may ever be folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermClass {
    /// Anything that does not start with an ASCII letter (digits first of all).
    Digit,
    /// Uppercase ASCII letter the term starts with.
    Letter(char),
}

impl TermClass {
    pub const COUNT: usize = 27;

    pub fn of(term: &str) -> Self {
        match term.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => TermClass::Letter(c.to_ascii_uppercase()),
            _ => TermClass::Digit,
        }
    }

    /// All buckets in on-disk order: `Num` first, then `A` to `Z`.
    pub fn all() -> impl Iterator<Item = TermClass> {
        std::iter::once(TermClass::Digit).chain((b'A'..=b'Z').map(|b| TermClass::Letter(b as char)))
    }

    /// `Num` is 0, `A` to `Z` are 1 to 26. A hand-built `Letter` outside
    /// ASCII letters counts as `Num`, like the term it would describe.
    pub fn ordinal(self) -> usize {
        match self {
            TermClass::Digit => 0,
            TermClass::Letter(c) => match c.to_ascii_uppercase() {
                u @ 'A'..='Z' => (u as u8 - b'A') as usize + 1,
                _ => 0,
            },
        }
    }

    /// File-name prefix of the bucket holding this class.
    pub fn bucket_name(self) -> String {
        match self.ordinal() {
            0 => "Num".to_string(),
            n => char::from(b'A' + (n - 1) as u8).to_string(),
        }
    }
}

/// Case-insensitive lookup key shared by every stage of the pipeline.
pub fn fold(term: &str) -> String {
    term.to_lowercase()
}

/// Total order used for segments, buckets and query lookups: bucket first,
/// then the folded term.
pub fn compare(a: &str, b: &str) -> Ordering {
    TermClass::of(a)
        .ordinal()
        .cmp(&TermClass::of(b).ordinal())
        .then_with(|| fold(a).cmp(&fold(b)))
}

/// Returns true when the term's surface form starts lowercase.
fn is_lowercase_form(term: &str) -> bool {
    term.chars().next().map_or(false, char::is_lowercase)
}

/// Picks the canonical surface form when `incoming` meets an already stored
/// `current` form of the same key. Lowercase wins for letter terms; other
/// terms keep whatever was stored first.
pub fn resolve_casing(current: &str, incoming: &str) -> String {
    match TermClass::of(current) {
        TermClass::Letter(_) if is_lowercase_form(current) || is_lowercase_form(incoming) => fold(current),
        _ => current.to_string(),
    }
}

/// Entities are multi-word spans; the space makes the flag recoverable from
/// the term itself once it has been written to disk.
pub fn looks_like_entity(term: &str) -> bool {
    term.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_leading_character() {
        assert_eq!(TermClass::of("apple"), TermClass::Letter('A'));
        assert_eq!(TermClass::of("Zebra"), TermClass::Letter('Z'));
        assert_eq!(TermClass::of("1990"), TermClass::Digit);
        assert_eq!(TermClass::of("éclair"), TermClass::Digit);
        assert_eq!(TermClass::all().count(), TermClass::COUNT);
        assert_eq!(TermClass::Letter('B').bucket_name(), "B");
        assert_eq!(TermClass::Digit.bucket_name(), "Num");
    }

    #[test]
    fn hand_built_letters_never_underflow() {
        assert_eq!(TermClass::Letter('m').ordinal(), TermClass::Letter('M').ordinal());
        assert_eq!(TermClass::Letter('m').bucket_name(), "M");
        assert_eq!(TermClass::Letter('7').ordinal(), 0);
        assert_eq!(TermClass::Letter('é').bucket_name(), "Num");
    }

    #[test]
    fn digits_sort_before_letters() {
        assert_eq!(compare("zzz", "123"), Ordering::Greater);
        assert_eq!(compare("Apple", "apple"), Ordering::Equal);
        assert_eq!(compare("apple", "Banana"), Ordering::Less);
    }

    #[test]
    fn lowercase_wins_for_letters_only() {
        assert_eq!(resolve_casing("Apple", "apple"), "apple");
        assert_eq!(resolve_casing("apple", "APPLE"), "apple");
        assert_eq!(resolve_casing("APPLE", "Apple"), "APPLE");
        assert_eq!(resolve_casing("10M", "10m"), "10M");
        assert_eq!(resolve_casing("NEW YORK", "new york"), "new york");
    }
}
