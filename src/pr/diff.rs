use std::collections::BTreeMap;

/// Classification of a single physical line of unified diff text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    /// File-level header (`diff --git`, `index`, `---`, `+++`, mode lines, ...)
    Header,
    /// `@@ -a,b +c,d @@`
    HunkHeader,
    /// Unchanged line, prefixed with a space
    Context,
    /// Added line, prefixed with '+'
    Addition,
    /// Removed line, prefixed with '-'
    Deletion,
    /// `\ No newline at end of file`
    Marker,
}

impl DiffLineKind {
    /// Classify `line`. Inside a hunk only content prefixes are accepted, so
    /// a removed line reading `-- x` is a deletion, not a `---` header.
    /// Content lines never start with `@`, so `@@` always opens a hunk, and
    /// a bare empty line inside a hunk is an empty context line.
    pub fn classify(line: &str, in_hunk: bool) -> Option<Self> {
        if line.starts_with("diff --git ") {
            return Some(Self::Header);
        }
        if line.starts_with("@@") {
            return Some(Self::HunkHeader);
        }
        if in_hunk {
            if line.is_empty() {
                return Some(Self::Context);
            }
            return Self::of_content(line);
        }
        if line.starts_with("--- ") || line.starts_with("+++ ") {
            Some(Self::Header)
        } else if line.is_empty() {
            None
        } else {
            Self::of_content(line).or(Some(Self::Header))
        }
    }

    fn of_content(line: &str) -> Option<Self> {
        match line.as_bytes().first() {
            Some(b' ') => Some(Self::Context),
            Some(b'+') => Some(Self::Addition),
            Some(b'-') => Some(Self::Deletion),
            Some(b'\\') => Some(Self::Marker),
            _ => None,
        }
    }
}

/// Mapping from line numbers in the new version of one file to the
/// 1-based position of that line within the file's block of the PR diff.
///
/// Positions are what GitHub review comments are addressed by. Only lines
/// that exist in the new file and appear inside a hunk (context or
/// addition lines) have an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffPositionIndex {
    positions: BTreeMap<usize, usize>,
    block_len: usize,
}

/// Old/new line budget of the hunk currently being scanned.
#[derive(Debug, Clone, Copy)]
struct HunkBudget {
    old: usize,
    new: usize,
}

impl HunkBudget {
    fn exhausted(&self) -> bool {
        self.old == 0 && self.new == 0
    }

    fn consume(&mut self, kind: DiffLineKind) {
        match kind {
            DiffLineKind::Context => {
                self.old = self.old.saturating_sub(1);
                self.new = self.new.saturating_sub(1);
            }
            DiffLineKind::Addition => self.new = self.new.saturating_sub(1),
            DiffLineKind::Deletion => self.old = self.old.saturating_sub(1),
            _ => {}
        }
    }
}

impl DiffPositionIndex {
    /// Build the index for `filename` from the full PR diff.
    ///
    /// The scan is lenient: a hunk header without a file header, or a
    /// hunk header that can't be parsed, simply produces no entries for
    /// that region.
    pub fn build(diff_lines: &[&str], filename: &str) -> Self {
        let mut index = DiffPositionIndex::default();

        let mut current_file: Option<&str> = None;
        let mut position = 0usize;
        let mut new_line: Option<usize> = None;
        let mut hunk: Option<HunkBudget> = None;

        for &line in diff_lines {
            let in_hunk = hunk.is_some_and(|h| !h.exhausted());
            let Some(kind) = DiffLineKind::classify(line, in_hunk) else {
                if in_hunk {
                    // Unknown line inside a hunk: line numbers can't be
                    // trusted until the next hunk header.
                    new_line = None;
                    hunk = None;
                }
                continue;
            };

            if kind == DiffLineKind::Header {
                if let Some(path) = line.strip_prefix("+++ ") {
                    current_file = new_file_path(path);
                    position = 0;
                    new_line = None;
                    hunk = None;
                    continue;
                }
                if line.starts_with("diff --git ") || line.starts_with("--- ") {
                    current_file = None;
                    new_line = None;
                    hunk = None;
                    continue;
                }
            }

            let Some(file) = current_file else {
                continue;
            };
            position += 1;
            let is_target = file == filename;
            if is_target {
                index.block_len = position;
            }

            match kind {
                DiffLineKind::HunkHeader => match parse_hunk_header(line) {
                    Some(((_, old_count), (new_start, new_count))) => {
                        new_line = Some(new_start);
                        hunk = Some(HunkBudget {
                            old: old_count,
                            new: new_count,
                        });
                    }
                    None => {
                        new_line = None;
                        hunk = None;
                    }
                },
                DiffLineKind::Context | DiffLineKind::Addition => {
                    if let Some(budget) = hunk.as_mut() {
                        budget.consume(kind);
                    }
                    if let Some(number) = new_line.as_mut() {
                        if is_target {
                            index.positions.insert(*number, position);
                        }
                        *number += 1;
                    }
                }
                DiffLineKind::Deletion => {
                    if let Some(budget) = hunk.as_mut() {
                        budget.consume(kind);
                    }
                }
                DiffLineKind::Header | DiffLineKind::Marker => {}
            }
        }

        index
    }

    /// Diff position of `line` in the new file, or `None` when the line is
    /// outside every hunk and can't be commented on.
    pub fn position(&self, line: usize) -> Option<usize> {
        self.positions.get(&line).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of positions in the file's diff block.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// `(new_line, position)` pairs in ascending line order.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.positions.iter().map(|(line, pos)| (*line, *pos))
    }
}

/// Split raw diff text into lines, tolerating `\r\n` endings.
pub fn diff_lines(raw_diff: &str) -> Vec<&str> {
    raw_diff.lines().collect()
}

/// Path of the new file from a `+++` header, `None` for `/dev/null`.
fn new_file_path(header: &str) -> Option<&str> {
    let path = header.split('\t').next().unwrap_or(header).trim_end();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix("b/").unwrap_or(path))
}

/// Parse `@@ -a,b +c,d @@ ...` into `((a, b), (c, d))`.
fn parse_hunk_header(line: &str) -> Option<((usize, usize), (usize, usize))> {
    let header = line.strip_prefix("@@")?.trim_start();
    let end = header.find("@@")?;
    let mut parts = header[..end].split_whitespace();
    let old = parse_range(parts.next()?, '-')?;
    let new = parse_range(parts.next()?, '+')?;
    Some((old, new))
}

fn parse_range(part: &str, prefix: char) -> Option<(usize, usize)> {
    let range = part.strip_prefix(prefix)?;
    let (start, count) = match range.split_once(',') {
        Some((start, count)) => (start, count),
        None => (range, "1"),
    };
    Some((start.parse().ok()?, count.parse().ok()?))
}
