//! Line-based three-way merge of file contents
//!
//! Both sides are diffed against the ancestor. Runs of ancestor lines kept by
//! both sides are stable; everything between two stable runs is a chunk that
//! one side, both sides identically, or both sides differently changed.

use crate::artifacts::diff::myers::MyersDiff;
use std::collections::HashMap;
use std::ops::Range;

/// Bytes inspected when sniffing for binary content
pub const BINARY_SNIFF_LENGTH: usize = 8000;

pub const OURS_MARKER: &[u8] = b"<<<<<<< ours\n";
pub const SEPARATOR_MARKER: &[u8] = b"=======\n";
pub const THEIRS_MARKER: &[u8] = b">>>>>>> theirs\n";

/// How conflicting chunks are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FileFavor {
    /// Leave conflict markers
    #[default]
    Normal,
    Ours,
    Theirs,
    /// Our lines followed by theirs
    Union,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileResult {
    /// False when the content carries conflict markers or could not be merged
    pub automergeable: bool,
    pub content: Vec<u8>,
}

pub fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_SNIFF_LENGTH)].contains(&0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Stable(Range<usize>),
    Changed {
        ancestor: Range<usize>,
        ours: Range<usize>,
        theirs: Range<usize>,
    },
}

struct Diff3<'l> {
    ancestor: Vec<&'l [u8]>,
    ours: Vec<&'l [u8]>,
    theirs: Vec<&'l [u8]>,
    /// ancestor line -> matching line on each side
    ours_matches: HashMap<usize, usize>,
    theirs_matches: HashMap<usize, usize>,
}

fn lines(content: &[u8]) -> Vec<&[u8]> {
    content.split_inclusive(|byte| *byte == b'\n').collect()
}

impl<'l> Diff3<'l> {
    fn new(ancestor: &'l [u8], ours: &'l [u8], theirs: &'l [u8]) -> Self {
        let (ancestor, ours, theirs) = (lines(ancestor), lines(ours), lines(theirs));
        let ours_matches = MyersDiff::new(&ancestor, &ours).matches().into_iter().collect();
        let theirs_matches = MyersDiff::new(&ancestor, &theirs).matches().into_iter().collect();

        Diff3 {
            ancestor,
            ours,
            theirs,
            ours_matches,
            theirs_matches,
        }
    }

    fn chunks(&self) -> Vec<Chunk> {
        let (mut o, mut a, mut b) = (0, 0, 0);
        let mut chunks = Vec::new();

        loop {
            let mut stable = 0;
            while o + stable < self.ancestor.len()
                && self.ours_matches.get(&(o + stable)) == Some(&(a + stable))
                && self.theirs_matches.get(&(o + stable)) == Some(&(b + stable))
            {
                stable += 1;
            }

            if stable > 0 {
                chunks.push(Chunk::Stable(o..o + stable));
                (o, a, b) = (o + stable, a + stable, b + stable);
                continue;
            }

            if o == self.ancestor.len() && a == self.ours.len() && b == self.theirs.len() {
                return chunks;
            }

            let next = (o..self.ancestor.len()).find_map(|line| {
                Some((line, *self.ours_matches.get(&line)?, *self.theirs_matches.get(&line)?))
            });
            let (next_o, next_a, next_b) =
                next.unwrap_or((self.ancestor.len(), self.ours.len(), self.theirs.len()));

            chunks.push(Chunk::Changed {
                ancestor: o..next_o,
                ours: a..next_a,
                theirs: b..next_b,
            });
            (o, a, b) = (next_o, next_a, next_b);
        }
    }
}

fn push_lines(output: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        output.extend_from_slice(line);
    }
}

fn push_marked(output: &mut Vec<u8>, lines: &[&[u8]]) {
    push_lines(output, lines);
    if lines.last().is_some_and(|line| !line.ends_with(b"\n")) {
        output.push(b'\n');
    }
}

/// Merge three versions of a file
///
/// Binary content is never merged line-wise: unless one side is unchanged or
/// a favor picks a side, the result holds our content and is not automergeable.
pub fn merge_file(ancestor: &[u8], ours: &[u8], theirs: &[u8], favor: FileFavor) -> MergeFileResult {
    let clean = |content: &[u8]| MergeFileResult {
        automergeable: true,
        content: content.to_vec(),
    };

    if ours == theirs || theirs == ancestor {
        return clean(ours);
    }
    if ours == ancestor {
        return clean(theirs);
    }

    if is_binary(ancestor) || is_binary(ours) || is_binary(theirs) {
        return match favor {
            FileFavor::Ours => clean(ours),
            FileFavor::Theirs => clean(theirs),
            FileFavor::Normal | FileFavor::Union => MergeFileResult {
                automergeable: false,
                content: ours.to_vec(),
            },
        };
    }

    let diff3 = Diff3::new(ancestor, ours, theirs);
    let mut content = Vec::with_capacity(ours.len().max(theirs.len()));
    let mut automergeable = true;

    for chunk in diff3.chunks() {
        match chunk {
            Chunk::Stable(range) => push_lines(&mut content, &diff3.ancestor[range]),
            Chunk::Changed {
                ancestor,
                ours,
                theirs,
            } => {
                let original = &diff3.ancestor[ancestor];
                let ours = &diff3.ours[ours];
                let theirs = &diff3.theirs[theirs];

                if ours == theirs || theirs == original {
                    push_lines(&mut content, ours);
                } else if ours == original {
                    push_lines(&mut content, theirs);
                } else {
                    match favor {
                        FileFavor::Ours => push_lines(&mut content, ours),
                        FileFavor::Theirs => push_lines(&mut content, theirs),
                        FileFavor::Union => {
                            push_marked(&mut content, ours);
                            push_lines(&mut content, theirs);
                        }
                        FileFavor::Normal => {
                            automergeable = false;
                            content.extend_from_slice(OURS_MARKER);
                            push_marked(&mut content, ours);
                            content.extend_from_slice(SEPARATOR_MARKER);
                            push_marked(&mut content, theirs);
                            content.extend_from_slice(THEIRS_MARKER);
                        }
                    }
                }
            }
        }
    }

    MergeFileResult {
        automergeable,
        content,
    }
}
