//! Line-oriented interactive session over a [`History`].

use std::io::{BufRead, Write};

use anyhow::{Context, Result, anyhow};

use crate::history::History;
use crate::operators::histogram;
use crate::operators::gray::{ALPHA_BETA_PRESETS, GAMMA_PRESETS};
use crate::recipe::{OPERATORS, OperatorSpec};
use crate::session;

const HELP: &str = "\
commands:
  open PATH            load an image and select it
  apply STEP           run an operator on the selection, e.g. `apply gaussian_blur:k=5`
  list                 show the history (* marks the selection)
  select N             select operation N
  delete               remove the selected operation
  save PATH            write the selected image
  hist PATH [2d]       write a histogram image of the selection
  bbox N               draw the selection's contour boxes on operation N
  contours             list the selection's contours
  export PATH          write the history to a .tar.zst session
  import PATH          replace the history with a saved session
  ops                  list operators and their parameters
  help                 show this text
  quit                 leave the shell";

/// Whether the loop should keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct Shell<W: Write> {
    history: History,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(history: History, out: W) -> Self {
        Self { history, out }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn into_history(self) -> History {
        self.history
    }

    /// Read commands until `quit` or end of input. Failed commands are
    /// reported and the session continues.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<()> {
        self.prompt()?;
        for line in input.lines() {
            let line = line.context("Failed to read command")?;
            match self.execute(&line) {
                Ok(Control::Quit) => break,
                Ok(Control::Continue) => {}
                Err(err) => {
                    tracing::warn!(command = line.trim(), "command failed: {err:#}");
                    writeln!(self.out, "error: {err:#}")?;
                }
            }
            self.prompt()?;
        }
        Ok(())
    }

    fn prompt(&mut self) -> Result<()> {
        write!(self.out, "cvlab> ")?;
        self.out.flush()?;
        Ok(())
    }

    fn print_selected(&mut self) -> Result<()> {
        if let (Some(index), Some(op)) = (self.history.selected_index(), self.history.selected()) {
            let (w, h) = op.dimensions();
            writeln!(self.out, "[{index}] {} ({w}x{h}, {} ch)", op.display_name(), op.channels())?;
        }
        Ok(())
    }

    /// Run one command line
    pub fn execute(&mut self, line: &str) -> Result<Control> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let arg = |what: &str| -> Result<&str> {
            if rest.is_empty() {
                Err(anyhow!("missing {what}"))
            } else {
                Ok(rest)
            }
        };

        match command {
            "" => {}
            "open" => {
                self.history.load_file(arg("path")?)?;
                self.print_selected()?;
            }
            "apply" => {
                let spec: OperatorSpec = arg("step")?.parse()?;
                self.history.apply(&spec)?;
                self.print_selected()?;
            }
            "list" => {
                let selected = self.history.selected_index();
                for (i, op) in self.history.iter().enumerate() {
                    let marker = if Some(i) == selected { '*' } else { ' ' };
                    writeln!(self.out, "{marker}[{i}] {}", op.display_name())?;
                }
            }
            "select" => {
                let index: usize = arg("index")?.parse().context("index must be a number")?;
                self.history.select(index)?;
                self.print_selected()?;
            }
            "delete" => {
                let removed = self.history.delete_selected()?;
                writeln!(self.out, "deleted {}", removed.display_name())?;
            }
            "save" => {
                let path = arg("path")?;
                self.history.save_selected(path)?;
                writeln!(self.out, "saved {path}")?;
            }
            "hist" => {
                let mut parts = arg("path")?.split_whitespace();
                let path = parts.next().unwrap_or_default();
                let two_d = parts.next() == Some("2d");
                let src = self.history.selected_input()?.image();
                let img = if two_d {
                    histogram::histogram_2d_image(src)?
                } else {
                    histogram::channel_histogram_image(
                        src,
                        histogram::DEFAULT_HIST_SIZE,
                        histogram::DEFAULT_WIDTH,
                        histogram::DEFAULT_HEIGHT,
                    )?
                };
                img.save(path).with_context(|| format!("Failed to write histogram {path}"))?;
                writeln!(self.out, "saved {path}")?;
            }
            "bbox" => {
                let target: usize = arg("target index")?.parse().context("index must be a number")?;
                self.history.draw_bounding_rects(target)?;
                self.print_selected()?;
            }
            "contours" => {
                let op = self.history.selected_input()?;
                let contours = op.contours();
                if contours.is_empty() {
                    writeln!(self.out, "no contours")?;
                }
                for (i, c) in contours.iter().enumerate() {
                    let r = c.bounding_rect;
                    writeln!(
                        self.out,
                        "{i}: area={:.1} perimeter={:.1} rect=({}, {}, {}x{}) points={}",
                        c.area,
                        c.perimeter,
                        r.x,
                        r.y,
                        r.width,
                        r.height,
                        c.points.len()
                    )?;
                }
            }
            "export" => {
                let path = arg("path")?;
                session::export(&self.history, path)?;
                writeln!(self.out, "exported {} operations to {path}", self.history.len())?;
            }
            "import" => {
                self.history = session::import(arg("path")?)?;
                writeln!(self.out, "imported {} operations", self.history.len())?;
            }
            "ops" => {
                for (name, params) in OPERATORS {
                    writeln!(self.out, "  {name:<20} {params}")?;
                }
                let gammas: Vec<String> = GAMMA_PRESETS.iter().map(f64::to_string).collect();
                writeln!(self.out, "  gamma presets: {}", gammas.join(", "))?;
                let pairs: Vec<String> = ALPHA_BETA_PRESETS.iter().map(|(a, b)| format!("({a}, {b})")).collect();
                writeln!(self.out, "  alpha/beta presets: {}", pairs.join(", "))?;
            }
            "help" => writeln!(self.out, "{HELP}")?,
            "quit" | "exit" => return Ok(Control::Quit),
            other => return Err(anyhow!("unknown command `{other}` (try `help`)")),
        }
        Ok(Control::Continue)
    }
}
