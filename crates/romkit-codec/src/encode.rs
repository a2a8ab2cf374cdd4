//! Greedy encoder.
//!
//! At every position the encoder considers all six non-literal commands and
//! emits the one that saves the most bytes over leaving the input literal.
//! The three copy kinds search hash chains keyed on the next three bytes
//! (plain, bit-reversed, and reversed-order), limited to the first 64 KiB of
//! output since references are 16-bit.

use std::collections::HashMap;

use tracing::debug;

use crate::command::{control_len, write_control, Command, END_MARKER, MAX_LEN, MAX_REFERENCE};

/// Candidates examined per hash chain.
const MAX_CHAIN: usize = 48;

#[derive(Clone, Copy, Debug)]
struct Candidate {
    command: Command,
    /// Run length as written in the control byte.
    len: usize,
    /// Input bytes covered.
    consumed: usize,
    /// Fill operand or reference offset.
    operand: [u8; 2],
}

impl Candidate {
    fn cost(&self) -> usize {
        control_len(self.len) + self.command.operand_len()
    }

    fn savings(&self) -> isize {
        self.consumed as isize - self.cost() as isize
    }

    fn reference(command: Command, from: usize, len: usize) -> Self {
        Self {
            command,
            len,
            consumed: len,
            operand: (from as u16).to_be_bytes(),
        }
    }
}

fn key(a: u8, b: u8, c: u8) -> u32 {
    u32::from_be_bytes([0, a, b, c])
}

struct Encoder<'a> {
    input: &'a [u8],
    out: Vec<u8>,
    forward: HashMap<u32, Vec<usize>>,
    reversed: HashMap<u32, Vec<usize>>,
    backward: HashMap<u32, Vec<usize>>,
    indexed: usize,
}

impl<'a> Encoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            out: Vec::with_capacity(input.len() / 2 + 16),
            forward: HashMap::new(),
            reversed: HashMap::new(),
            backward: HashMap::new(),
            indexed: 0,
        }
    }

    /// Make every position before `pos` available as a reference source.
    fn index_until(&mut self, pos: usize) {
        let d = self.input;
        let limit = pos.min(MAX_REFERENCE + 1);
        while self.indexed < limit {
            let p = self.indexed;
            if p + 2 < d.len() {
                self.forward.entry(key(d[p], d[p + 1], d[p + 2])).or_default().push(p);
                self.reversed
                    .entry(key(d[p].reverse_bits(), d[p + 1].reverse_bits(), d[p + 2].reverse_bits()))
                    .or_default()
                    .push(p);
            }
            if p >= 2 {
                self.backward.entry(key(d[p], d[p - 1], d[p - 2])).or_default().push(p);
            }
            self.indexed += 1;
        }
    }

    fn run(mut self) -> Vec<u8> {
        let n = self.input.len();
        let mut pos = 0;
        let mut literal_start = 0;

        while pos < n {
            self.index_until(pos);
            let pending_literals = pos > literal_start;
            // Breaking a literal run costs a control byte later on.
            let threshold = if pending_literals { 2 } else { 1 };

            match self.best_candidate(pos) {
                Some(c) if c.savings() >= threshold => {
                    self.flush_literals(literal_start, pos);
                    self.emit(&c);
                    pos += c.consumed;
                    literal_start = pos;
                }
                _ => pos += 1,
            }
        }

        self.flush_literals(literal_start, n);
        self.out.push(END_MARKER);
        self.out
    }

    fn best_candidate(&self, pos: usize) -> Option<Candidate> {
        let remaining = self.input.len() - pos;
        let cap = remaining.min(MAX_LEN);

        let mut best: Option<Candidate> = None;
        let mut consider = |c: Candidate| {
            let better = match &best {
                None => true,
                Some(b) => (c.savings(), c.consumed) > (b.savings(), b.consumed),
            };
            if better {
                best = Some(c);
            }
        };

        for c in [self.byte_fill(pos, cap), self.word_fill(pos), self.increasing_fill(pos, cap)]
            .into_iter()
            .flatten()
        {
            consider(c);
        }

        if remaining >= 3 {
            for c in [self.forward_copy(pos, cap), self.reversed_copy(pos, cap), self.backward_copy(pos, cap)]
                .into_iter()
                .flatten()
            {
                consider(c);
            }
        }

        best
    }

    fn byte_fill(&self, pos: usize, cap: usize) -> Option<Candidate> {
        let d = self.input;
        let value = d[pos];
        let len = d[pos..pos + cap].iter().take_while(|&&b| b == value).count();
        Some(Candidate {
            command: Command::ByteFill,
            len,
            consumed: len,
            operand: [value, 0],
        })
    }

    fn word_fill(&self, pos: usize) -> Option<Candidate> {
        let d = self.input;
        if pos + 1 >= d.len() {
            return None;
        }
        let (a, b) = (d[pos], d[pos + 1]);
        let words = d[pos..]
            .chunks_exact(2)
            .take(MAX_LEN)
            .take_while(|w| w[0] == a && w[1] == b)
            .count();
        Some(Candidate {
            command: Command::WordFill,
            len: words,
            consumed: words * 2,
            operand: [a, b],
        })
    }

    fn increasing_fill(&self, pos: usize, cap: usize) -> Option<Candidate> {
        let d = self.input;
        let start = d[pos];
        let len = d[pos..pos + cap]
            .iter()
            .enumerate()
            .take_while(|&(i, &b)| b == start.wrapping_add(i as u8))
            .count();
        Some(Candidate {
            command: Command::IncreasingFill,
            len,
            consumed: len,
            operand: [start, 0],
        })
    }

    fn chain(map: &HashMap<u32, Vec<usize>>, k: u32) -> impl Iterator<Item = usize> + '_ {
        map.get(&k)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .rev()
            .take(MAX_CHAIN)
            .copied()
    }

    /// Longest match among `candidates`, as `(from, len)`.
    fn longest<I, F>(candidates: I, cap: usize, match_len: F) -> Option<(usize, usize)>
    where
        I: Iterator<Item = usize>,
        F: Fn(usize) -> usize,
    {
        let mut best: Option<(usize, usize)> = None;
        for from in candidates {
            let len = match_len(from);
            if len > 0 && best.map_or(true, |(_, l)| len > l) {
                best = Some((from, len));
                if len == cap {
                    break;
                }
            }
        }
        best
    }

    fn forward_copy(&self, pos: usize, cap: usize) -> Option<Candidate> {
        let d = self.input;
        let k = key(d[pos], d[pos + 1], d[pos + 2]);
        let (from, len) = Self::longest(Self::chain(&self.forward, k), cap, |from| {
            (0..cap).take_while(|&i| d[from + i] == d[pos + i]).count()
        })?;
        Some(Candidate::reference(Command::Copy, from, len))
    }

    fn reversed_copy(&self, pos: usize, cap: usize) -> Option<Candidate> {
        let d = self.input;
        let k = key(d[pos], d[pos + 1], d[pos + 2]);
        let (from, len) = Self::longest(Self::chain(&self.reversed, k), cap, |from| {
            (0..cap).take_while(|&i| d[from + i].reverse_bits() == d[pos + i]).count()
        })?;
        Some(Candidate::reference(Command::BitReversedCopy, from, len))
    }

    fn backward_copy(&self, pos: usize, cap: usize) -> Option<Candidate> {
        let d = self.input;
        let k = key(d[pos], d[pos + 1], d[pos + 2]);
        let (from, len) = Self::longest(Self::chain(&self.backward, k), cap, |from| {
            (0..cap.min(from + 1)).take_while(|&i| d[from - i] == d[pos + i]).count()
        })?;
        Some(Candidate::reference(Command::BackwardCopy, from, len))
    }

    fn emit(&mut self, c: &Candidate) {
        write_control(&mut self.out, c.command, c.len);
        self.out.extend_from_slice(&c.operand[..c.command.operand_len()]);
    }

    fn flush_literals(&mut self, start: usize, end: usize) {
        for chunk in self.input[start..end].chunks(MAX_LEN) {
            write_control(&mut self.out, Command::Literal, chunk.len());
            self.out.extend_from_slice(chunk);
        }
    }
}

/// Size of the trivial all-literal encoding of `n` bytes, end marker included.
pub fn literal_encoding_len(n: usize) -> usize {
    let full = n / MAX_LEN;
    let rest = n % MAX_LEN;
    let tail = if rest == 0 { 0 } else { control_len(rest) + rest };
    full * (control_len(MAX_LEN) + MAX_LEN) + tail + 1
}

/// Encode `input` using literal runs only.
pub fn compress_literal(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(literal_encoding_len(input.len()));
    for chunk in input.chunks(MAX_LEN) {
        write_control(&mut out, Command::Literal, chunk.len());
        out.extend_from_slice(chunk);
    }
    out.push(END_MARKER);
    out
}

/// Compress `input`. The result always decodes back to `input` and is never
/// longer than [`literal_encoding_len`].
pub fn compress(input: &[u8]) -> Vec<u8> {
    let greedy = Encoder::new(input).run();
    if greedy.len() <= literal_encoding_len(input.len()) {
        debug!(input = input.len(), output = greedy.len(), "compressed block");
        greedy
    } else {
        debug!(input = input.len(), "greedy encoding lost to literal fallback");
        compress_literal(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decompress;

    #[test]
    fn empty_input() {
        assert_eq!(compress(&[]), [END_MARKER]);
        assert_eq!(literal_encoding_len(0), 1);
    }

    #[test]
    fn literal_length_formula() {
        assert_eq!(literal_encoding_len(1), 3);
        assert_eq!(literal_encoding_len(32), 34);
        assert_eq!(literal_encoding_len(33), 36);
        assert_eq!(literal_encoding_len(1024), 1027);
        assert_eq!(literal_encoding_len(1025), 1029);
        for n in [0, 1, 31, 32, 33, 1023, 1024, 1025, 5000] {
            let data: Vec<u8> = (0..n).map(|i| (i * 7 + 3) as u8).collect();
            assert_eq!(compress_literal(&data).len(), literal_encoding_len(n));
        }
    }

    #[test]
    fn runs_use_fills() {
        let data = vec![0x5A; 300];
        let packed = compress(&data);
        // Extended byte fill: two control bytes, one operand, end marker.
        assert_eq!(packed, [0xE5, 0x2B, 0x5A, END_MARKER]);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn word_and_increasing_fills_roundtrip() {
        let mut data = Vec::new();
        for _ in 0..40 {
            data.extend_from_slice(&[0x12, 0x34]);
        }
        data.extend((0..=255u8).cycle().skip(200).take(100));
        let packed = compress(&data);
        assert!(packed.len() < 16);
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn repeated_and_mirrored_text_uses_copies() {
        let phrase = b"THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG. ";
        let mut data = Vec::new();
        data.extend_from_slice(phrase);
        data.extend(phrase.iter().rev());
        data.extend(phrase.iter().map(|b| b.reverse_bits()));
        data.extend_from_slice(phrase);
        let packed = compress(&data);
        assert!(packed.len() < phrase.len() + 20, "got {} bytes", packed.len());
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn references_stay_within_sixteen_bits() {
        let block: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 253) as u8).collect();
        let data: Vec<u8> = block.iter().copied().cycle().take(150_000).collect();
        let packed = compress(&data);
        assert!(packed.len() < data.len() / 4);
        assert_eq!(decompress(&packed).unwrap(), data);
    }
}
