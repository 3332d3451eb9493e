//! Static per-file Huffman coding over the byte alphabet.
//!
//! Tree construction is deterministic: the priority queue orders nodes by
//! ascending weight and breaks ties by the smallest symbol contained in the
//! subtree. Identical frequencies therefore always produce an identical code
//! table, which keeps stored codebooks byte-for-byte reproducible.

use crate::bits::BitBuf;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Number of distinct symbols (all byte values).
pub const ALPHABET_SIZE: usize = 256;

/// Occurrence count of every byte value in an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frequencies([u64; ALPHABET_SIZE]);

impl Frequencies {
    /// Build from explicit per-symbol counts.
    pub fn from_counts(counts: [u64; ALPHABET_SIZE]) -> Self {
        Frequencies(counts)
    }

    /// Count the bytes of `data`.
    pub fn count(data: &[u8]) -> Self {
        let mut counts = [0u64; ALPHABET_SIZE];
        for &byte in data {
            counts[byte as usize] += 1;
        }
        Frequencies(counts)
    }

    /// Number of symbols with a nonzero count.
    pub fn distinct(&self) -> usize {
        self.0.iter().filter(|&&c| c > 0).count()
    }

    /// Iterate `(symbol, count)` over nonzero counts in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(s, c)| (s as u8, *c))
    }
}

impl Default for Frequencies {
    fn default() -> Self {
        Frequencies([0; ALPHABET_SIZE])
    }
}

#[derive(Debug)]
enum Node {
    Leaf { symbol: u8 },
    Internal { left: Box<Node>, right: Box<Node> },
}

/// Heap slot; `Ord` is reversed so `BinaryHeap` pops the lightest node first.
struct Pending {
    weight: u64,
    min_symbol: u8,
    node: Node,
}

impl Pending {
    fn key(&self) -> (u64, u8) {
        (self.weight, self.min_symbol)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// A Huffman prefix tree. Each internal node owns exactly two children.
#[derive(Debug)]
pub struct HuffmanTree {
    root: Node,
}

impl HuffmanTree {
    /// Build the tree for the given frequencies.
    ///
    /// Returns `None` when every count is zero (empty input has no tree).
    pub fn build(freqs: &Frequencies) -> Option<Self> {
        let mut heap: BinaryHeap<Pending> = freqs
            .iter()
            .map(|(symbol, weight)| Pending {
                weight,
                min_symbol: symbol,
                node: Node::Leaf { symbol },
            })
            .collect();

        while heap.len() > 1 {
            let (Some(a), Some(b)) = (heap.pop(), heap.pop()) else {
                break;
            };
            heap.push(Pending {
                weight: a.weight + b.weight,
                min_symbol: a.min_symbol.min(b.min_symbol),
                node: Node::Internal {
                    left: Box::new(a.node),
                    right: Box::new(b.node),
                },
            });
        }

        heap.pop().map(|p| HuffmanTree { root: p.node })
    }

    /// Derive the code table by walking the tree (0 = left, 1 = right).
    ///
    /// A tree made of a single leaf is treated as the left child of an implicit
    /// root, so its symbol receives the one-bit code `0` rather than an empty code.
    pub fn code_table(&self) -> CodeTable {
        let mut table = CodeTable::new();
        let mut path = BitBuf::new();
        match &self.root {
            Node::Leaf { symbol } => {
                path.push(false);
                table.codes[*symbol as usize] = Some(path);
            }
            internal => collect_codes(internal, &mut path, &mut table),
        }
        table
    }
}

fn collect_codes(node: &Node, path: &mut BitBuf, table: &mut CodeTable) {
    match node {
        Node::Leaf { symbol } => {
            table.codes[*symbol as usize] = Some(path.clone());
        }
        Node::Internal { left, right } => {
            path.push(false);
            collect_codes(left, path, table);
            path.pop();
            path.push(true);
            collect_codes(right, path, table);
            path.pop();
        }
    }
}

/// Per-symbol prefix codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: [Option<BitBuf>; ALPHABET_SIZE],
}

impl CodeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            codes: std::array::from_fn(|_| None),
        }
    }

    /// Build the table for `data` (empty table for empty input).
    pub fn for_data(data: &[u8]) -> Self {
        HuffmanTree::build(&Frequencies::count(data))
            .map(|tree| tree.code_table())
            .unwrap_or_default()
    }

    /// Code assigned to `symbol`, if any.
    pub fn get(&self, symbol: u8) -> Option<&BitBuf> {
        self.codes[symbol as usize].as_ref()
    }

    /// Assign a code to `symbol`. Fails on an empty code or a repeated symbol.
    pub fn insert(&mut self, symbol: u8, code: BitBuf) -> Result<()> {
        if code.is_empty() {
            return Err(Error::format(format!(
                "Zero-length code for symbol {}",
                symbol
            )));
        }
        let slot = &mut self.codes[symbol as usize];
        if slot.is_some() {
            return Err(Error::format(format!(
                "Duplicate codebook entry for symbol {}",
                symbol
            )));
        }
        *slot = Some(code);
        Ok(())
    }

    /// Iterate `(symbol, code)` in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &BitBuf)> + '_ {
        self.codes
            .iter()
            .enumerate()
            .filter_map(|(s, c)| c.as_ref().map(|code| (s as u8, code)))
    }

    /// Number of symbols with a code.
    pub fn len(&self) -> usize {
        self.codes.iter().filter(|c| c.is_some()).count()
    }

    /// True when no symbol has a code.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Longest code length in bits (0 for an empty table).
    pub fn max_code_len(&self) -> usize {
        self.iter().map(|(_, c)| c.len()).max().unwrap_or(0)
    }

    /// Total payload bits needed to encode input with these frequencies.
    pub fn payload_bits(&self, freqs: &Frequencies) -> u64 {
        freqs
            .iter()
            .map(|(s, count)| count * self.get(s).map_or(0, |c| c.len() as u64))
            .sum()
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `data` with `table`, appending codes MSB first.
///
/// The returned buffer's length is the payload bit count.
pub fn encode(data: &[u8], table: &CodeTable) -> Result<BitBuf> {
    let capacity = table.payload_bits(&Frequencies::count(data));
    let mut out = BitBuf::with_capacity(capacity as usize);
    for &byte in data {
        let code = table
            .get(byte)
            .ok_or_else(|| Error::format(format!("No code for symbol {}", byte)))?;
        out.extend_from(code);
    }
    Ok(out)
}

/// Decode `original_size` symbols from `payload` using `table`.
pub fn decode(payload: &BitBuf, table: &CodeTable, original_size: u64) -> Result<Vec<u8>> {
    DecodeTrie::from_table(table)?.decode(payload, original_size)
}

#[derive(Debug, Default)]
struct TrieNode {
    children: [Option<usize>; 2],
    symbol: Option<u8>,
}

/// Decoding trie rebuilt from a code table, stored as an index arena.
#[derive(Debug)]
pub struct DecodeTrie {
    nodes: Vec<TrieNode>,
}

impl DecodeTrie {
    /// Insert every code of `table`. Fails if the codes are not a prefix code.
    pub fn from_table(table: &CodeTable) -> Result<Self> {
        let mut trie = DecodeTrie {
            nodes: vec![TrieNode::default()],
        };
        for (symbol, code) in table.iter() {
            trie.insert(symbol, code)?;
        }
        Ok(trie)
    }

    fn insert(&mut self, symbol: u8, code: &BitBuf) -> Result<()> {
        let conflict =
            || Error::format(format!("Code for symbol {} breaks the prefix property", symbol));

        let mut cur = 0;
        for bit in code.iter() {
            if self.nodes[cur].symbol.is_some() {
                return Err(conflict());
            }
            let branch = bit as usize;
            cur = match self.nodes[cur].children[branch] {
                Some(next) => next,
                None => {
                    self.nodes.push(TrieNode::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[cur].children[branch] = Some(next);
                    next
                }
            };
        }

        let node = &mut self.nodes[cur];
        if cur == 0 || node.symbol.is_some() || node.children.iter().any(Option::is_some) {
            return Err(conflict());
        }
        node.symbol = Some(symbol);
        Ok(())
    }

    /// Walk `payload` bit by bit, emitting a symbol at every leaf.
    ///
    /// Stops once `original_size` symbols are produced or the bits run out, so
    /// zero padding in the final byte is never decoded. Running out of bits
    /// before `original_size` symbols is reported as truncation.
    pub fn decode(&self, payload: &BitBuf, original_size: u64) -> Result<Vec<u8>> {
        // Every symbol consumes at least one bit.
        let capacity = original_size.min(payload.len() as u64) as usize;
        let mut out = Vec::with_capacity(capacity);
        let mut cur = 0;

        for (position, bit) in payload.iter().enumerate() {
            if out.len() as u64 >= original_size {
                break;
            }
            cur = self.nodes[cur].children[bit as usize].ok_or_else(|| {
                Error::format(format!("Invalid code in payload at bit {}", position))
            })?;
            if let Some(symbol) = self.nodes[cur].symbol {
                out.push(symbol);
                cur = 0;
            }
        }

        if (out.len() as u64) < original_size {
            return Err(Error::truncated(original_size, out.len() as u64));
        }
        Ok(out)
    }
}
