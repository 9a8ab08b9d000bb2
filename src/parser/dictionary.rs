use log::trace;
use thiserror::Error;

use super::error::DecodeError;

pub(crate) type Code = u16;

/// GIF caps codes at 12 bits.
pub(crate) const MAX_CODE_WIDTH: u8 = 12;
const MAX_ENTRIES: usize = 1 << MAX_CODE_WIDTH;

pub(crate) fn max_code_for_width(width: u8) -> Code {
    ((1u32 << width) - 1) as Code
}

/// One dictionary run, stored as the run of `prefix` followed by `suffix`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry {
    prefix: Option<Code>,
    suffix: u8,
    first: u8,
    len: u16,
}

impl Entry {
    fn literal(color: u8) -> Self {
        Self {
            prefix: None,
            suffix: color,
            first: color,
            len: 1,
        }
    }

    /// First color index of the run.
    pub(crate) fn first(&self) -> u8 {
        self.first
    }

    pub(crate) fn len(&self) -> usize {
        self.len.into()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum LookupError {
    /// The code is the one the next insertion will define.
    #[error("code {0} is not defined yet")]
    NotYetDefined(Code),

    #[error("code {code} is reserved")]
    Reserved { code: Code },

    #[error("code {code} is beyond the next free code {next_free}")]
    OutOfRange { code: Code, next_free: Code },
}

impl From<LookupError> for DecodeError {
    fn from(error: LookupError) -> Self {
        DecodeError::malformed(error.to_string())
    }
}

/// The adaptive LZW code table. Entries are kept in an arena indexed by code
/// and every run points back at a strictly earlier code.
#[derive(Debug)]
pub(crate) struct CodeDictionary {
    entries: Vec<Entry>,
    root_size: u8,
    code_width: u8,
    next_free: Code,
}

impl CodeDictionary {
    pub(crate) fn new(root_size: u8) -> Result<Self, DecodeError> {
        if !(2..=8).contains(&root_size) {
            return Err(DecodeError::unsupported(format!(
                "root code size {root_size} is outside of 2..=8"
            )));
        }

        let mut dictionary = Self {
            entries: Vec::with_capacity(MAX_ENTRIES),
            root_size,
            code_width: root_size + 1,
            next_free: 0,
        };
        dictionary.reset();
        Ok(dictionary)
    }

    pub(crate) fn reset(&mut self) {
        let literals = 1u16 << self.root_size;

        self.entries.clear();
        self.entries.extend((0..literals).map(|color| Entry::literal(color as u8)));
        // clear and end of information never resolve to a run, these only keep
        // the arena index in step with the code
        self.entries.extend([Entry::literal(0), Entry::literal(0)]);

        self.code_width = self.root_size + 1;
        self.next_free = self.end_of_information_code() + 1;
    }

    pub(crate) fn clear_code(&self) -> Code {
        1 << self.root_size
    }

    pub(crate) fn end_of_information_code(&self) -> Code {
        self.clear_code() + 1
    }

    pub(crate) fn code_width(&self) -> u8 {
        self.code_width
    }

    pub(crate) fn next_free_code(&self) -> Code {
        self.next_free
    }

    pub(crate) fn max_code(&self) -> Code {
        max_code_for_width(self.code_width)
    }

    /// No insertions are accepted until the next reset.
    pub(crate) fn is_full(&self) -> bool {
        usize::from(self.next_free) >= MAX_ENTRIES
    }

    pub(crate) fn lookup(&self, code: Code) -> Result<&Entry, LookupError> {
        if code == self.clear_code() || code == self.end_of_information_code() {
            return Err(LookupError::Reserved { code });
        }

        match code.cmp(&self.next_free) {
            std::cmp::Ordering::Less => Ok(&self.entries[usize::from(code)]),
            std::cmp::Ordering::Equal => Err(LookupError::NotYetDefined(code)),
            std::cmp::Ordering::Greater => Err(LookupError::OutOfRange {
                code,
                next_free: self.next_free,
            }),
        }
    }

    /// Defines the next free code as the run of `prior` followed by `color`.
    pub(crate) fn insert(&mut self, prior: Code, color: u8) -> Result<Code, DecodeError> {
        if self.is_full() {
            return Err(DecodeError::unsupported(format!(
                "dictionary already holds {MAX_ENTRIES} codes, more would need more than {MAX_CODE_WIDTH} bits"
            )));
        }

        let parent = *self.lookup(prior)?;
        let code = self.next_free;
        self.entries.push(Entry {
            prefix: Some(prior),
            suffix: color,
            first: parent.first,
            len: parent.len + 1,
        });
        self.next_free += 1;

        if self.next_free > self.max_code() {
            if self.code_width < MAX_CODE_WIDTH {
                self.code_width += 1;
                trace!("code width grew to {} bits", self.code_width);
            } else {
                trace!("dictionary is full, expecting a clear code");
            }
        }

        Ok(code)
    }

    /// Writes the run of `code` into `run`, replacing its contents.
    pub(crate) fn expand(&self, code: Code, run: &mut Vec<u8>) -> Result<(), LookupError> {
        let entry = self.lookup(code)?;
        run.clear();
        run.reserve(entry.len());

        let mut next = Some(code);
        while let Some(code) = next {
            let entry = &self.entries[usize::from(code)];
            run.push(entry.suffix);
            next = entry.prefix;
        }
        run.reverse();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_until_full(dictionary: &mut CodeDictionary) -> Vec<u8> {
        let mut widths = vec![dictionary.code_width()];
        let mut prior = 0;
        while !dictionary.is_full() {
            prior = dictionary.insert(prior, 1).unwrap();
            widths.push(dictionary.code_width());
        }
        widths
    }

    #[test]
    fn starts_with_literals_and_reserved_codes() {
        let dictionary = CodeDictionary::new(2).unwrap();
        assert_eq!(dictionary.clear_code(), 4);
        assert_eq!(dictionary.end_of_information_code(), 5);
        assert_eq!(dictionary.next_free_code(), 6);
        assert_eq!(dictionary.code_width(), 3);
        assert_eq!(dictionary.max_code(), 7);

        for color in 0..4 {
            let entry = dictionary.lookup(color).unwrap();
            assert_eq!(entry.first(), color as u8);
            assert_eq!(entry.len(), 1);
        }
    }

    #[test]
    fn lookup_distinguishes_pending_from_invalid_codes() {
        let dictionary = CodeDictionary::new(2).unwrap();
        assert_eq!(dictionary.lookup(6).unwrap_err(), LookupError::NotYetDefined(6));
        assert_eq!(dictionary.lookup(7).unwrap_err(), LookupError::OutOfRange { code: 7, next_free: 6 });
        assert_eq!(dictionary.lookup(4).unwrap_err(), LookupError::Reserved { code: 4 });
        assert_eq!(dictionary.lookup(5).unwrap_err(), LookupError::Reserved { code: 5 });
    }

    #[test]
    fn rejects_unsupported_root_sizes() {
        assert!(matches!(CodeDictionary::new(1), Err(DecodeError::UnsupportedFormat(_))));
        assert!(matches!(CodeDictionary::new(9), Err(DecodeError::UnsupportedFormat(_))));
        assert!(CodeDictionary::new(8).is_ok());
    }

    #[test]
    fn runs_are_expanded_through_their_prefixes() {
        let mut dictionary = CodeDictionary::new(2).unwrap();
        let ab = dictionary.insert(0, 1).unwrap();
        let abc = dictionary.insert(ab, 2).unwrap();
        let abcc = dictionary.insert(abc, 2).unwrap();

        let mut run = Vec::new();
        dictionary.expand(abcc, &mut run).unwrap();
        assert_eq!(run, vec![0, 1, 2, 2]);
        assert_eq!(dictionary.lookup(abcc).unwrap().len(), 4);
        assert_eq!(dictionary.lookup(abcc).unwrap().first(), 0);

        dictionary.expand(3, &mut run).unwrap();
        assert_eq!(run, vec![3]);
    }

    #[test]
    fn width_grows_when_the_next_code_no_longer_fits() {
        let mut dictionary = CodeDictionary::new(2).unwrap();
        dictionary.insert(0, 0).unwrap();
        assert_eq!(dictionary.code_width(), 3);
        dictionary.insert(0, 1).unwrap();
        assert_eq!(dictionary.next_free_code(), 8);
        assert_eq!(dictionary.code_width(), 4);
        assert_eq!(dictionary.max_code(), 15);
    }

    #[test]
    fn width_is_monotonic_until_reset() {
        let mut dictionary = CodeDictionary::new(3).unwrap();
        let widths = fill_until_full(&mut dictionary);

        assert!(widths.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(widths.first(), Some(&4));
        assert_eq!(widths.last(), Some(&MAX_CODE_WIDTH));
        assert_eq!(usize::from(dictionary.next_free_code()), MAX_ENTRIES);
    }

    #[test]
    fn full_dictionary_refuses_inserts_until_reset() {
        let mut dictionary = CodeDictionary::new(2).unwrap();
        fill_until_full(&mut dictionary);

        assert!(dictionary.is_full());
        assert!(matches!(dictionary.insert(0, 0), Err(DecodeError::UnsupportedFormat(_))));
        assert!(dictionary.lookup(4095).is_ok());

        dictionary.reset();
        assert!(!dictionary.is_full());
        assert_eq!(dictionary.code_width(), 3);
        assert_eq!(dictionary.next_free_code(), 6);
        assert!(dictionary.insert(0, 0).is_ok());
    }

    #[test]
    fn closed_form_max_codes() {
        assert_eq!(max_code_for_width(2), 3);
        assert_eq!(max_code_for_width(9), 511);
        assert_eq!(max_code_for_width(12), 4095);
    }
}
