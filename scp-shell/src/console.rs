//! Output helpers: column layout and a minimal pager.

use std::io::{self, BufRead, IsTerminal, Write};

const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 24;
const GUTTER: usize = 2;
const MORE: &str = "-- more --";
const ERASE_LINE: &str = "\r\x1b[2K";
const CURSOR_UP: &str = "\x1b[1A";

/// Terminal geometry and whether to pause between screenfuls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Console {
    width: usize,
    /// Lines per page; `None` writes everything without pausing.
    page: Option<usize>,
}

impl Console {
    /// Inspect the controlling terminal.  Paging is enabled only when both
    /// stdin and stdout are terminals.
    pub fn detect() -> Self {
        let (width, height) = terminal_size().unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let interactive = io::stdout().is_terminal() && io::stdin().is_terminal();
        Self {
            width,
            page: interactive.then(|| height.saturating_sub(1).max(1)),
        }
    }

    /// A fixed-width console that never pauses.
    pub fn plain(width: usize) -> Self {
        Self { width, page: None }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Write `lines` to `out`, pausing after every page when interactive.
    ///
    /// Stops early when the user answers `q`; `lines` is dropped either way.
    /// A read error from `lines` is returned after what was read so far has
    /// been written.
    pub fn lesspipe<I>(&self, out: &mut dyn Write, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        self.page_through(out, &mut io::stdin().lock(), lines)
    }

    fn page_through<I>(
        &self,
        out: &mut dyn Write,
        input: &mut dyn BufRead,
        lines: I,
    ) -> io::Result<()>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let mut shown = 0;
        for line in lines {
            if self.page == Some(shown) {
                if !more(out, input)? {
                    break;
                }
                shown = 0;
            }
            writeln!(out, "{}", line?)?;
            shown += 1;
        }
        out.flush()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::plain(DEFAULT_WIDTH)
    }
}

/// Ask whether to continue; `false` means quit.  The marker is erased once
/// answered.
fn more(out: &mut dyn Write, input: &mut dyn BufRead) -> io::Result<bool> {
    write!(out, "{MORE}")?;
    out.flush()?;
    let mut answer = String::new();
    let read = input.read_line(&mut answer)?;
    // The echoed newline moved the cursor below the marker.
    if answer.ends_with('\n') {
        write!(out, "{CURSOR_UP}")?;
    }
    write!(out, "{ERASE_LINE}")?;
    Ok(read > 0 && !answer.trim().eq_ignore_ascii_case("q"))
}

/// Lay `names` out column-major in as many columns as fit in `width`.
pub fn in_columns(names: &[String], width: usize) -> Vec<String> {
    if names.is_empty() {
        return Vec::new();
    }

    let longest = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);
    let column = longest + GUTTER;
    let columns = (width / column).clamp(1, names.len());
    let rows = names.len().div_ceil(columns);

    (0..rows)
        .map(|row| {
            let cells: Vec<&str> = (0..columns)
                .filter_map(|col| names.get(col * rows + row))
                .map(String::as_str)
                .collect();
            let mut line = String::new();
            for (i, cell) in cells.iter().enumerate() {
                line.push_str(cell);
                if i + 1 < cells.len() {
                    let pad = column - cell.chars().count();
                    line.extend(std::iter::repeat_n(' ', pad));
                }
            }
            line
        })
        .collect()
}

/// `(columns, rows)` of the terminal attached to stdout.
fn terminal_size() -> Option<(usize, usize)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into the winsize we pass.
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ.into(), &mut size) };
    if rc != 0 || size.ws_col == 0 {
        return None;
    }
    Some((size.ws_col as usize, size.ws_row as usize))
}
