//! GP0 packet buffer.
//!
//! Sixteen words deep. Words written while it's full are dropped, which matches what happens when
//! software writes GP0 faster than commands are executed.

use psx_util::Bit;

const CAPACITY: usize = 16;

pub struct Fifo {
    words: [u32; CAPACITY],
    /// Slot of the oldest word.
    start: usize,
    len: usize,
}

impl Fifo {
    pub fn new() -> Self {
        Self { words: [0x0; CAPACITY], start: 0, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == CAPACITY
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    fn slot(&self, offset: usize) -> usize {
        (self.start + offset) % CAPACITY
    }

    /// Returns false and drops `word` if there is no room.
    pub fn try_push(&mut self, word: u32) -> bool {
        if self.is_full() {
            warn!("GP0 word {word:08x} dropped, FIFO full");
            return false;
        }
        self.words[self.slot(self.len)] = word;
        self.len += 1;
        true
    }

    /// Pops the oldest word. Popping an empty buffer reads a stale slot.
    pub fn pop(&mut self) -> u32 {
        if self.is_empty() {
            warn!("GP0 FIFO popped while empty");
            return self.words[self.start];
        }
        let word = self.words[self.start];
        self.start = self.slot(1);
        self.len -= 1;
        word
    }

    pub fn get(&self, offset: usize) -> Option<u32> {
        (offset < self.len).then(|| self.words[self.slot(offset)])
    }

    /// Opcode of the command at the front.
    pub fn next_cmd(&self) -> Option<u32> {
        self.get(0).map(|word| word.bit_range(24, 31))
    }

    pub fn next_cmd_len(&self) -> Option<usize> {
        self.next_cmd().map(cmd_len)
    }

    pub fn has_full_cmd(&self) -> bool {
        self.next_cmd_len().map_or(false, |len| len <= self.len)
    }
}

/// Words making up the GP0 command `cmd`, the command word included. Polylines only count up
/// to their second vertex since the rest is streamed until the terminator.
fn cmd_len(cmd: u32) -> usize {
    let textured = cmd.bit(2) as usize;
    let shaded = cmd.bit(4) as usize;
    match cmd {
        0x02 => 3,
        0x20..=0x3f => {
            let verts = if cmd.bit(3) { 4 } else { 3 };
            1 + verts * (1 + textured) + shaded * (verts - 1)
        }
        0x40..=0x5f => 3 + shaded,
        0x60..=0x7f => {
            let sized = (cmd.bit_range(3, 4) == 0) as usize;
            2 + textured + sized
        }
        0x80..=0x9f => 4,
        0xa0..=0xdf => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_when_full() {
        let mut fifo = Fifo::new();
        for i in 0..16 {
            assert!(fifo.try_push(i));
        }
        assert!(fifo.is_full());
        assert!(!fifo.try_push(0xdead));

        for i in 0..10 {
            assert_eq!(fifo.pop(), i);
        }
        for i in 16..26 {
            assert!(fifo.try_push(i));
        }

        assert_eq!(fifo.len(), 16);
        assert_eq!(fifo.get(0), Some(10));
        assert_eq!(fifo.get(15), Some(25));
        assert_eq!(fifo.get(16), None);
    }

    #[test]
    fn clear_empties() {
        let mut fifo = Fifo::new();
        fifo.try_push(0x0200_0000);
        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(fifo.next_cmd(), None);
    }

    #[test]
    fn waits_for_whole_command() {
        let mut fifo = Fifo::new();
        assert!(!fifo.has_full_cmd());

        // Shaded, textured quad.
        fifo.try_push(0x3c00_0000);
        assert_eq!(fifo.next_cmd_len(), Some(12));

        for i in 1..11 {
            fifo.try_push(i);
        }
        assert!(!fifo.has_full_cmd());

        fifo.try_push(11);
        assert!(fifo.has_full_cmd());
    }

    #[test]
    fn command_lengths() {
        let lens = [
            (0x00, 1), (0x01, 1), (0x02, 3), (0x1f, 1),
            (0x20, 4), (0x24, 7), (0x28, 5), (0x2c, 9),
            (0x30, 6), (0x34, 9), (0x38, 8), (0x3c, 12),
            (0x40, 3), (0x48, 3), (0x50, 4), (0x58, 4),
            (0x60, 3), (0x64, 4), (0x68, 2), (0x6c, 3),
            (0x70, 2), (0x74, 3), (0x78, 2), (0x7c, 3),
            (0x80, 4), (0xa0, 3), (0xc0, 3), (0xe1, 1), (0xff, 1),
        ];
        for (cmd, len) in lens {
            assert_eq!(cmd_len(cmd), len, "GP0({cmd:02x})");
        }
    }
}
