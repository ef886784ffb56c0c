//! Minimal pickle stream scanner
//!
//! Walks a binary pickle stream (protocols 2 through 5, the ones emitted by
//! joblib and torch checkpoint writers) with a reduced value stack: strings
//! are kept, everything else collapses to an opaque placeholder. That is
//! enough to recover the two things the loaders care about without
//! materializing any payload data:
//!
//! - class paths pushed via GLOBAL / STACK_GLOBAL (the estimator type)
//! - string keys stored into dicts via SETITEM / SETITEMS / DICT (the
//!   parameter names of a saved state dict)
//!
//! The walker validates structure as it goes: an unknown opcode, a
//! truncated payload, or a missing STOP all fail the scan, which the
//! loaders surface as a load failure.

/// What a successful scan recovered from the stream
#[derive(Debug, Default)]
pub struct PickleSummary {
    pub protocol: u8,
    /// `(module, qualname)` pairs, in stream order
    pub globals: Vec<(String, String)>,
    /// String dict keys, in stream order, deduplicated
    pub dict_keys: Vec<String>,
}

/// Reduced pickle value: strings survive, everything else is opaque
#[derive(Debug, Clone)]
enum Val {
    Str(String),
    Other,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<Val>,
    marks: Vec<usize>,
    memo: std::collections::HashMap<u32, Val>,
    memo_next: u32,
    summary: PickleSummary,
}

/// Scan a pickle stream to its STOP opcode
pub fn scan(bytes: &[u8]) -> Result<PickleSummary, String> {
    Scanner {
        bytes,
        pos: 0,
        stack: Vec::new(),
        marks: Vec::new(),
        memo: std::collections::HashMap::new(),
        memo_next: 0,
        summary: PickleSummary::default(),
    }
    .run()
}

impl Scanner<'_> {
    fn run(mut self) -> Result<PickleSummary, String> {
        loop {
            let at = self.pos;
            let op = self.u1()?;
            match op {
                // PROTO
                0x80 => self.summary.protocol = self.u1()?,
                // FRAME: length hint only, no stack effect
                0x95 => {
                    self.u8_le()?;
                }
                // STOP
                b'.' => {
                    if self.stack.is_empty() {
                        return Err("STOP with empty stack".into());
                    }
                    return Ok(self.summary);
                }

                // MARK
                b'(' => self.marks.push(self.stack.len()),
                // POP / POP_MARK / DUP
                b'0' => {
                    self.pop(at)?;
                }
                b'1' => {
                    self.pop_to_mark(at)?;
                }
                b'2' => {
                    let top = self.top(at)?.clone();
                    self.stack.push(top);
                }

                // Atoms that push an opaque value
                b'N' | 0x88 | 0x89 | b')' | b']' | b'}' | 0x8f | 0x97 => {
                    self.stack.push(Val::Other)
                }
                // READONLY_BUFFER: no stack effect
                0x98 => {}

                // Integers and floats
                b'K' => self.skip_push(1)?,
                b'M' => self.skip_push(2)?,
                b'J' => self.skip_push(4)?,
                b'G' => self.skip_push(8)?,
                0x8a => {
                    let n = self.u1()? as usize;
                    self.skip_push(n)?;
                }
                0x8b => {
                    let n = self.u4_le()? as usize;
                    self.skip_push(n)?;
                }

                // Byte payloads
                b'C' => {
                    let n = self.u1()? as usize;
                    self.skip_push(n)?;
                }
                b'B' => {
                    let n = self.u4_le()? as usize;
                    self.skip_push(n)?;
                }
                0x8e | 0x96 => {
                    let n = self.u8_le()? as usize;
                    self.skip_push(n)?;
                }

                // Strings
                b'U' => {
                    let n = self.u1()? as usize;
                    self.push_str(n)?;
                }
                b'T' | b'X' => {
                    let n = self.u4_le()? as usize;
                    self.push_str(n)?;
                }
                0x8c => {
                    let n = self.u1()? as usize;
                    self.push_str(n)?;
                }
                0x8d => {
                    let n = self.u8_le()? as usize;
                    self.push_str(n)?;
                }

                // GLOBAL: two newline-terminated lines
                b'c' => {
                    let module = self.line()?;
                    let name = self.line()?;
                    self.summary.globals.push((module, name));
                    self.stack.push(Val::Other);
                }
                // STACK_GLOBAL: module and qualname off the stack
                0x93 => {
                    let name = self.pop(at)?;
                    let module = self.pop(at)?;
                    if let (Val::Str(module), Val::Str(name)) = (module, name) {
                        self.summary.globals.push((module, name));
                    }
                    self.stack.push(Val::Other);
                }

                // Object construction
                b'R' | 0x81 => {
                    self.pop(at)?;
                    self.pop(at)?;
                    self.stack.push(Val::Other);
                }
                0x92 => {
                    self.pop(at)?;
                    self.pop(at)?;
                    self.pop(at)?;
                    self.stack.push(Val::Other);
                }
                // BUILD: state is consumed, object stays
                b'b' => {
                    self.pop(at)?;
                    self.top(at)?;
                }

                // Persistent references (torch storages)
                b'P' => {
                    self.line()?;
                    self.stack.push(Val::Other);
                }
                b'Q' => {
                    self.pop(at)?;
                    self.stack.push(Val::Other);
                }

                // Containers from marked items
                b't' | b'l' | 0x91 => {
                    self.pop_to_mark(at)?;
                    self.stack.push(Val::Other);
                }
                b'd' => {
                    let items = self.pop_to_mark(at)?;
                    self.record_pairs(&items);
                    self.stack.push(Val::Other);
                }
                0x85 => {
                    self.pop(at)?;
                    self.stack.push(Val::Other);
                }
                0x86 => {
                    self.pop(at)?;
                    self.pop(at)?;
                    self.stack.push(Val::Other);
                }
                0x87 => {
                    self.pop(at)?;
                    self.pop(at)?;
                    self.pop(at)?;
                    self.stack.push(Val::Other);
                }

                // Container mutation
                b'a' => {
                    self.pop(at)?;
                    self.top(at)?;
                }
                b'e' | 0x90 => {
                    self.pop_to_mark(at)?;
                    self.top(at)?;
                }
                b's' => {
                    let _value = self.pop(at)?;
                    let key = self.pop(at)?;
                    self.record_key(key);
                    self.top(at)?;
                }
                b'u' => {
                    let items = self.pop_to_mark(at)?;
                    self.record_pairs(&items);
                    self.top(at)?;
                }

                // Memo
                b'q' => {
                    let idx = self.u1()? as u32;
                    self.memo_put(idx, at)?;
                }
                b'r' => {
                    let idx = self.u4_le()?;
                    self.memo_put(idx, at)?;
                }
                0x94 => {
                    let idx = self.memo_next;
                    self.memo_put(idx, at)?;
                }
                b'h' => {
                    let idx = self.u1()? as u32;
                    self.memo_get(idx);
                }
                b'j' => {
                    let idx = self.u4_le()?;
                    self.memo_get(idx);
                }

                other => {
                    return Err(format!(
                        "unsupported pickle opcode 0x{other:02x} at offset {at}"
                    ))
                }
            }
        }
    }

    fn record_key(&mut self, key: Val) {
        if let Val::Str(key) = key {
            if !self.summary.dict_keys.contains(&key) {
                self.summary.dict_keys.push(key);
            }
        }
    }

    fn record_pairs(&mut self, items: &[Val]) {
        for pair in items.chunks_exact(2) {
            self.record_key(pair[0].clone());
        }
    }

    fn memo_put(&mut self, idx: u32, at: usize) -> Result<(), String> {
        let top = self.top(at)?.clone();
        self.memo.insert(idx, top);
        self.memo_next = self.memo_next.max(idx.saturating_add(1));
        Ok(())
    }

    fn memo_get(&mut self, idx: u32) {
        let val = self.memo.get(&idx).cloned().unwrap_or(Val::Other);
        self.stack.push(val);
    }

    fn pop(&mut self, at: usize) -> Result<Val, String> {
        self.stack
            .pop()
            .ok_or_else(|| format!("stack underflow at offset {at}"))
    }

    fn top(&mut self, at: usize) -> Result<&Val, String> {
        self.stack
            .last()
            .ok_or_else(|| format!("stack underflow at offset {at}"))
    }

    fn pop_to_mark(&mut self, at: usize) -> Result<Vec<Val>, String> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| format!("no open MARK at offset {at}"))?;
        if mark > self.stack.len() {
            return Err(format!("MARK beyond stack at offset {at}"));
        }
        Ok(self.stack.split_off(mark))
    }

    fn skip_push(&mut self, n: usize) -> Result<(), String> {
        self.take(n)?;
        self.stack.push(Val::Other);
        Ok(())
    }

    fn push_str(&mut self, n: usize) -> Result<(), String> {
        let s = String::from_utf8_lossy(self.take(n)?).into_owned();
        self.stack.push(Val::Str(s));
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&[u8], String> {
        // pos <= len always holds, so the subtraction cannot underflow and
        // a huge length prefix cannot overflow the comparison
        if n > self.bytes.len() - self.pos {
            return Err(format!(
                "truncated stream: wanted {n} bytes at offset {}",
                self.pos
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u4_le(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8_le(&mut self) -> Result<u64, String> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn line(&mut self) -> Result<String, String> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        if self.pos == self.bytes.len() {
            return Err(format!("unterminated line at offset {start}"));
        }
        let line = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        self.pos += 1; // consume the newline
        Ok(line)
    }
}
