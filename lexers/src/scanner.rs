#![deny(warnings)]

/// Backtrackable cursor over any iterator. Elements are pulled lazily and
/// kept until `ignore`/`extract` drops everything up to the cursor.
pub struct Scanner<I: Iterator>
where
    I::Item: Clone,
{
    src: I,
    buf: Vec<I::Item>,
    // index into buf of the last consumed element, -1 before the first one
    pos: isize,
    dropped: usize,
}

impl<I> Iterator for Scanner<I>
where
    I: Iterator,
    I::Item: Clone,
{
    type Item = I::Item;
    fn next(&mut self) -> Option<Self::Item> {
        self.pos += 1;
        while self.pos >= self.buf.len() as isize {
            match self.src.next() {
                Some(item) => self.buf.push(item),
                None => {
                    self.pos = self.buf.len() as isize;
                    return None;
                }
            }
        }
        self.curr()
    }
}

impl<I> Scanner<I>
where
    I: Iterator,
    I::Item: Clone,
{
    pub fn new(source: I) -> Scanner<I> {
        Scanner {
            src: source,
            buf: Vec::new(),
            pos: -1,
            dropped: 0,
        }
    }

    /// Cursor position, only meaningful for `set_pos` until the next
    /// `ignore`/`extract`.
    pub fn pos(&self) -> isize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: isize) -> bool {
        if pos < -1 || pos > self.buf.len() as isize {
            return false;
        }
        self.pos = pos;
        true
    }

    /// Number of elements dropped so far, ie: the source offset of the
    /// first element not yet ignored.
    pub fn offset(&self) -> usize {
        self.dropped
    }

    pub fn curr(&self) -> Option<I::Item> {
        if self.pos < 0 {
            return None;
        }
        self.buf.get(self.pos as usize).cloned()
    }

    pub fn peek(&mut self) -> Option<I::Item> {
        let backtrack = self.pos;
        let peeked = self.next();
        self.pos = backtrack;
        peeked
    }

    fn consumed(&self) -> usize {
        ((self.pos + 1).max(0) as usize).min(self.buf.len())
    }

    pub fn ignore(&mut self) {
        let n = self.consumed();
        self.buf.drain(..n);
        self.dropped += n;
        self.pos = -1;
    }

    pub fn extract(&mut self) -> Vec<I::Item> {
        let n = self.consumed();
        let taken: Vec<I::Item> = self.buf.drain(..n).collect();
        self.dropped += n;
        self.pos = -1;
        taken
    }
}

impl<I> Scanner<I>
where
    I: Iterator,
    I::Item: Clone + PartialEq,
{
    /// Consume the next element if it equals `what`.
    pub fn accept(&mut self, what: &I::Item) -> Option<I::Item> {
        let backtrack = self.pos;
        match self.next() {
            Some(next) if &next == what => Some(next),
            _ => {
                self.pos = backtrack;
                None
            }
        }
    }
}

impl<I: Iterator<Item = char>> Scanner<I> {
    pub fn extract_string(&mut self) -> String {
        self.extract().into_iter().collect()
    }

    pub fn accept_char(&mut self, c: char) -> bool {
        self.accept(&c).is_some()
    }

    // consume the next char if it's one of 'any'
    pub fn accept_any_char(&mut self, any: &str) -> Option<char> {
        let backtrack = self.pos;
        match self.next() {
            Some(next) if any.contains(next) => Some(next),
            _ => {
                self.pos = backtrack;
                None
            }
        }
    }

    // true if at least one char was consumed
    pub fn skip_all_chars(&mut self, over: &str) -> bool {
        let mut advanced = false;
        while self.accept_any_char(over).is_some() {
            advanced = true;
        }
        advanced
    }

    /// Drop what was consumed so far and any whitespace that follows.
    pub fn ignore_ws(&mut self) {
        self.skip_all_chars(" \t\r\n");
        self.ignore();
    }
}
