//! The line-editing front end.
//!
//! Tab completion asks the session's dispatch tree for candidates; each
//! candidate is highlighted with the color of its category.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, Editor, Helper};

use crate::handler::HandlerType;
use crate::shell::Shell;

/// Start of the word under the cursor, and the unquoted words typed before
/// it followed by the unquoted partial word.
///
/// Words split the way `shlex` splits a whole line, so only unquoted ASCII
/// blanks separate them.
pub fn split_at_cursor(line: &str, pos: usize) -> (usize, Vec<String>) {
    let head = &line[..pos];
    let start = word_start(head);
    let mut words = shlex::split(&head[..start]).unwrap_or_else(|| {
        head[..start]
            .split_ascii_whitespace()
            .map(str::to_string)
            .collect()
    });
    words.push(unquote_partial(&head[start..]));
    (start, words)
}

/// Byte offset just past the last blank in `head` that is outside quotes.
fn word_start(head: &str) -> usize {
    let mut start = 0;
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in head.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some(_), '"') => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ' ' | '\t' | '\n') => start = i + c.len_utf8(),
            _ => {}
        }
    }
    start
}

/// Unquote a word that may still have an open quote.
fn unquote_partial(word: &str) -> String {
    ["", "'", "\""]
        .iter()
        .find_map(|close| shlex::split(&format!("{word}{close}")))
        .map(|words| words.concat())
        .unwrap_or_else(|| word.to_string())
}

/// What Tab inserts for `name`: the name quoted for `shlex::split`, then a
/// space.
fn replacement(name: &str) -> String {
    match shlex::try_quote(name) {
        Ok(quoted) => format!("{quoted} "),
        Err(e) => {
            log::debug!("cannot quote {name:?}: {e}");
            format!("{name} ")
        }
    }
}

pub struct ShellHelper {
    shell: Rc<RefCell<Shell>>,
    color: bool,
    prompt: RefCell<String>,
    /// Category of each candidate offered by the latest completion.
    categories: RefCell<HashMap<String, HandlerType>>,
}

impl ShellHelper {
    pub fn new(shell: Rc<RefCell<Shell>>, color: bool) -> Self {
        Self {
            shell,
            color,
            prompt: RefCell::new(String::new()),
            categories: RefCell::new(HashMap::new()),
        }
    }

    /// Render the prompt for the next line; returns its plain text.
    fn refresh_prompt(&self) -> String {
        let shell = self.shell.borrow();
        *self.prompt.borrow_mut() = shell.render_prompt(self.color);
        shell.render_prompt(false)
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, words) = split_at_cursor(line, pos);
        let tokens: Vec<&str> = words.iter().map(String::as_str).collect();
        let candidates = self.shell.borrow_mut().complete(&tokens);

        let mut categories = self.categories.borrow_mut();
        categories.clear();

        let pairs = candidates
            .into_iter()
            .map(|(name, handler)| {
                categories.insert(name.clone(), handler.handler_type());
                Pair {
                    replacement: replacement(&name),
                    display: name,
                }
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for ShellHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default && self.color {
            Cow::Owned(self.prompt.borrow().clone())
        } else {
            Cow::Borrowed(prompt)
        }
    }

    fn highlight_candidate<'c>(
        &self,
        candidate: &'c str,
        _completion: CompletionType,
    ) -> Cow<'c, str> {
        if !self.color {
            return Cow::Borrowed(candidate);
        }
        match self.categories.borrow().get(candidate) {
            Some(category) => Cow::Owned(candidate.color(HandlerType::color(*category)).to_string()),
            None => Cow::Borrowed(candidate),
        }
    }
}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

/// Run the read-eval loop until `exit`, end of input, or a terminal error.
pub fn run(shell: Shell, history: Option<PathBuf>) -> rustyline::Result<()> {
    let color = shell.color();
    let shell = Rc::new(RefCell::new(shell));

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .auto_add_history(true)
        .build();
    let mut editor: Editor<ShellHelper, DefaultHistory> = Editor::with_config(config)?;
    editor.set_helper(Some(ShellHelper::new(shell.clone(), color)));

    if let Some(path) = &history {
        if let Err(e) = editor.load_history(path) {
            log::debug!("no history loaded from {}: {e}", path.display());
        }
    }

    loop {
        let prompt = match editor.helper() {
            Some(helper) => helper.refresh_prompt(),
            None => shell.borrow().render_prompt(false),
        };

        match editor.readline(&prompt) {
            Ok(line) => {
                shell.borrow_mut().execute(&line);
                if shell.borrow().is_exiting() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        }
    }

    if let Some(path) = &history {
        save_history(&mut editor, path);
    }
    Ok(())
}

fn save_history(editor: &mut Editor<ShellHelper, DefaultHistory>, path: &Path) {
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            log::warn!("could not create {}: {e}", dir.display());
            return;
        }
    }
    if let Err(e) = editor.save_history(path) {
        log::warn!("could not save history to {}: {e}", path.display());
    }
}
