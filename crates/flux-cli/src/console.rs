//! Line-oriented control console for a running engine.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use flux_engine::dsp::{ParamKind, Parameter};
use flux_engine::{ChainPreset, EngineStats, ParamValue, PathController};

pub const HELP: &str = "\
commands:
  add <effect>              append an effect
  insert <i> <effect>       insert before position i
  rm <i>                    remove effect i
  mv <from> <to>            move an effect
  set <i> <param> <value>   set a parameter (use _ for spaces in names)
  tempo <i> <param> on|off  follow the shared tempo
  bpm <value>               set the tempo
  tap                       tap tempo
  bypass                    toggle processing
  rec | stop-rec            record a loop
  loop | stop-loop          loop playback
  erase                     discard the loop
  show                      print the chain
  save <file> | load <file> chain presets (JSON)
  stats                     xrun counters
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(String),
    Insert(usize, String),
    Remove(usize),
    Move(usize, usize),
    Set {
        index: usize,
        param: String,
        value: ParamValue,
    },
    Tempo {
        index: usize,
        param: String,
        on: bool,
    },
    Bpm(f64),
    Tap,
    Bypass,
    Record,
    StopRecord,
    Loop,
    StopLoop,
    Erase,
    Show,
    Save(PathBuf),
    Load(PathBuf),
    Stats,
    Help,
    Quit,
}

fn index(tok: Option<&str>) -> Result<usize> {
    let tok = tok.ok_or_else(|| anyhow!("missing index"))?;
    tok.parse().with_context(|| format!("bad index `{tok}`"))
}

fn rest(words: &[&str], what: &str) -> Result<String> {
    if words.is_empty() {
        bail!("missing {what}");
    }
    Ok(words.join(" "))
}

fn param_name(tok: Option<&str>) -> Result<String> {
    tok.map(|p| p.replace('_', " "))
        .ok_or_else(|| anyhow!("missing parameter name"))
}

fn value(words: &[&str]) -> Result<ParamValue> {
    let text = rest(words, "value")?;
    Ok(match text.parse::<f64>() {
        Ok(v) => ParamValue::Number(v),
        Err(_) => ParamValue::Choice(text),
    })
}

/// Parse one console line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let args = &words[1..];
    let cmd = match words[0].to_ascii_lowercase().as_str() {
        "add" => Command::Add(rest(args, "effect name")?),
        "insert" => Command::Insert(
            index(args.first().copied())?,
            rest(args.get(1..).unwrap_or_default(), "effect name")?,
        ),
        "rm" | "remove" => Command::Remove(index(args.first().copied())?),
        "mv" | "move" => Command::Move(
            index(args.first().copied())?,
            index(args.get(1).copied())?,
        ),
        "set" => Command::Set {
            index: index(args.first().copied())?,
            param: param_name(args.get(1).copied())?,
            value: value(args.get(2..).unwrap_or_default())?,
        },
        "tempo" => Command::Tempo {
            index: index(args.first().copied())?,
            param: param_name(args.get(1).copied())?,
            on: match args.get(2).copied() {
                Some("on") => true,
                Some("off") => false,
                other => bail!("expected on|off, got {}", other.unwrap_or("nothing")),
            },
        },
        "bpm" => {
            let tok = args.first().ok_or_else(|| anyhow!("missing bpm"))?;
            Command::Bpm(tok.parse().with_context(|| format!("bad bpm `{tok}`"))?)
        }
        "tap" => Command::Tap,
        "bypass" => Command::Bypass,
        "rec" => Command::Record,
        "stop-rec" => Command::StopRecord,
        "loop" => Command::Loop,
        "stop-loop" => Command::StopLoop,
        "erase" => Command::Erase,
        "show" | "ls" => Command::Show,
        "save" => Command::Save(rest(args, "file")?.into()),
        "load" => Command::Load(rest(args, "file")?.into()),
        "stats" => Command::Stats,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command `{other}` (try `help`)"),
    };
    Ok(Some(cmd))
}

/// Range summary for listings, e.g. `20..22050` or `LP|HP|BP|BS`.
pub fn describe_range(p: &Parameter) -> String {
    match p.kind() {
        ParamKind::Discrete(choices) => choices
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join("|"),
        ParamKind::Tempo(_) => format!("{}..{} bpm, tempo-linkable", p.minimum(), p.maximum()),
        ParamKind::Numeric(_) => format!("{}..{}", p.minimum(), p.maximum()),
    }
}

pub struct Console<W: Write> {
    ctl: PathController,
    stats: Arc<EngineStats>,
    out: W,
    seen_xruns: (u64, u64),
}

impl<W: Write> Console<W> {
    pub fn new(ctl: PathController, stats: Arc<EngineStats>, out: W) -> Self {
        Self {
            ctl,
            stats,
            out,
            seen_xruns: (0, 0),
        }
    }

    pub fn controller(&self) -> &PathController {
        &self.ctl
    }

    pub fn controller_mut(&mut self) -> &mut PathController {
        &mut self.ctl
    }

    /// Execute one command. Returns `Ok(false)` on quit.
    pub fn handle(&mut self, cmd: Command) -> Result<bool> {
        log::debug!("console: {cmd:?}");
        match cmd {
            Command::Add(name) => {
                let i = self.ctl.append(&name)?;
                self.announce_added(i)?;
            }
            Command::Insert(index, name) => {
                let i = self.ctl.insert(index, &name)?;
                self.announce_added(i)?;
            }
            Command::Remove(index) => self.ctl.remove(index)?,
            Command::Move(from, to) => self.ctl.move_effect(from, to)?,
            Command::Set { index, param, value } => {
                if !self.ctl.set_parameter(index, &param, &value)? {
                    bail!("{param} rejected `{value}`");
                }
            }
            Command::Tempo { index, param, on } => {
                if !self.ctl.set_tempo_mode(index, &param, on)? {
                    bail!("{param} cannot follow the tempo");
                }
            }
            Command::Bpm(bpm) => {
                if !self.ctl.tempo().set_bpm(bpm) {
                    bail!("bpm must be between 0 and 1000 (exclusive)");
                }
            }
            Command::Tap => match self.ctl.tempo().tap(Instant::now()) {
                Some(bpm) => writeln!(self.out, "tempo {bpm:.1} bpm")?,
                None => writeln!(self.out, "tap again")?,
            },
            Command::Bypass => {
                let on = !self.ctl.processing_enabled();
                self.ctl.set_processing_enabled(on)?;
                writeln!(self.out, "processing {}", if on { "on" } else { "bypassed" })?;
            }
            Command::Record => self.ctl.start_recording()?,
            Command::StopRecord => self.ctl.stop_recording()?,
            Command::Loop => self.ctl.start_loop()?,
            Command::StopLoop => self.ctl.stop_loop()?,
            Command::Erase => self.ctl.erase_loop()?,
            Command::Show => self.show()?,
            Command::Save(path) => {
                self.ctl
                    .preset()
                    .save(&path)
                    .with_context(|| format!("saving {}", path.display()))?;
                log::info!("saved {} effects to {}", self.ctl.len(), path.display());
            }
            Command::Load(path) => {
                let preset = ChainPreset::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?;
                self.ctl.load_preset(&preset)?;
                log::info!("loaded {} effects from {}", self.ctl.len(), path.display());
            }
            Command::Stats => writeln!(
                self.out,
                "overruns {}  underruns {}",
                self.stats.overruns(),
                self.stats.underruns()
            )?,
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn announce_added(&mut self, index: usize) -> Result<()> {
        if let Some((name, _)) = self.ctl.effects().nth(index) {
            writeln!(self.out, "{index}: {name}")?;
        }
        Ok(())
    }

    fn show(&mut self) -> Result<()> {
        if self.ctl.is_empty() {
            writeln!(self.out, "(empty chain)")?;
        }
        for (i, (name, params)) in self.ctl.effects().enumerate() {
            let mut line = format!("{i:>2}  {name}");
            for (pname, p) in params.iter() {
                line.push_str(&format!("  {pname}={}", p.get()));
                if p.uses_tempo() {
                    line.push_str(&format!(" (tempo {})", p.value()));
                }
            }
            writeln!(self.out, "{line}")?;
        }
        writeln!(
            self.out,
            "tempo {} bpm  processing {}  loop {:?}",
            self.ctl.tempo().bpm(),
            if self.ctl.processing_enabled() { "on" } else { "bypassed" },
            self.ctl.loop_state()
        )?;
        Ok(())
    }

    fn report_xruns(&mut self) {
        let now = (self.stats.overruns(), self.stats.underruns());
        if now.0 > self.seen_xruns.0 {
            log::warn!("{} input overruns", now.0 - self.seen_xruns.0);
        }
        if now.1 > self.seen_xruns.1 {
            log::warn!("{} output underruns", now.1 - self.seen_xruns.1);
        }
        self.seen_xruns = now;
    }

    /// Parse and run one line; errors are logged, never fatal. Returns
    /// `false` on quit.
    pub fn run_line(&mut self, line: &str) -> bool {
        let keep_going = match parse(line) {
            Ok(Some(cmd)) => match self.handle(cmd) {
                Ok(more) => more,
                Err(e) => {
                    log::warn!("{e:#}");
                    true
                }
            },
            Ok(None) => true,
            Err(e) => {
                log::warn!("{e:#}");
                true
            }
        };
        self.ctl.collect_retired();
        self.report_xruns();
        keep_going
    }

    /// Read commands until `quit` or end of input.
    pub fn run(&mut self, input: impl BufRead) -> Result<()> {
        for line in input.lines() {
            let line = line.context("reading console input")?;
            if !self.run_line(&line) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_engine::{AudioPath, LoopState, PathSettings, TempoContext};

    fn fresh() -> (AudioPath, Console<Vec<u8>>) {
        let settings = PathSettings {
            max_loop_samples: 1024,
            ..PathSettings::default()
        };
        let (path, ctl) = AudioPath::new(&settings, Arc::new(TempoContext::default()));
        (path, Console::new(ctl, Arc::new(EngineStats::default()), Vec::new()))
    }

    fn output(console: &mut Console<Vec<u8>>) -> String {
        String::from_utf8(std::mem::take(&mut console.out)).unwrap()
    }

    #[test]
    fn parses_chain_edits() {
        assert_eq!(
            parse("add Basic Filter").unwrap(),
            Some(Command::Add("Basic Filter".into()))
        );
        assert_eq!(
            parse("insert 2 3-Band Equalizer").unwrap(),
            Some(Command::Insert(2, "3-Band Equalizer".into()))
        );
        assert_eq!(parse("rm 0").unwrap(), Some(Command::Remove(0)));
        assert_eq!(parse("mv 3 1").unwrap(), Some(Command::Move(3, 1)));
    }

    #[test]
    fn parses_parameter_commands() {
        assert_eq!(
            parse("set 1 Pass_Threshold 120").unwrap(),
            Some(Command::Set {
                index: 1,
                param: "Pass Threshold".into(),
                value: ParamValue::Number(120.0),
            })
        );
        assert_eq!(
            parse("set 0 Shape Square").unwrap(),
            Some(Command::Set {
                index: 0,
                param: "Shape".into(),
                value: ParamValue::Choice("Square".into()),
            })
        );
        assert_eq!(
            parse("tempo 0 Speed on").unwrap(),
            Some(Command::Tempo {
                index: 0,
                param: "Speed".into(),
                on: true,
            })
        );
        assert_eq!(parse("bpm 96.5").unwrap(), Some(Command::Bpm(96.5)));
    }

    #[test]
    fn parses_transport_and_misc() {
        for (line, cmd) in [
            ("tap", Command::Tap),
            ("bypass", Command::Bypass),
            ("rec", Command::Record),
            ("stop-rec", Command::StopRecord),
            ("loop", Command::Loop),
            ("stop-loop", Command::StopLoop),
            ("erase", Command::Erase),
            ("show", Command::Show),
            ("stats", Command::Stats),
            ("QUIT", Command::Quit),
        ] {
            assert_eq!(parse(line).unwrap(), Some(cmd), "{line}");
        }
        assert_eq!(
            parse("save my chain.json").unwrap(),
            Some(Command::Save("my chain.json".into()))
        );
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("# note").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in ["add", "rm x", "mv 1", "set 0 Amount", "tempo 0 Speed maybe", "bpm fast", "wah"] {
            assert!(parse(line).is_err(), "{line}");
        }
    }

    #[test]
    fn edits_and_show() {
        let (_path, mut console) = fresh();
        assert!(console.run_line("add gain"));
        assert!(console.run_line("add Tremolo"));
        assert!(console.run_line("set 0 amount 2.5"));
        assert!(console.run_line("tempo 1 speed on"));
        assert!(console.run_line("bpm 150"));
        output(&mut console);

        console.run_line("show");
        let shown = output(&mut console);
        assert!(shown.contains(" 0  Gain  Amount=2.5"), "{shown}");
        assert!(shown.contains("Speed=180 (tempo 150)"), "{shown}");
        assert!(shown.contains("tempo 150 bpm"), "{shown}");
    }

    #[test]
    fn misuse_is_reported_but_not_fatal() {
        let (_path, mut console) = fresh();
        assert!(console.handle(Command::Remove(0)).is_err());
        assert!(console.handle(Command::Add("Wah".into())).is_err());
        assert!(console.handle(Command::Bpm(0.0)).is_err());
        console.handle(Command::Add("Tremolo".into())).unwrap();
        assert!(console
            .handle(Command::Tempo {
                index: 0,
                param: "Mix".into(),
                on: true
            })
            .is_err());
        assert!(console.run_line("rm 7"));
        assert!(!console.run_line("quit"));
    }

    #[test]
    fn bypass_toggles() {
        let (_path, mut console) = fresh();
        console.run_line("bypass");
        assert!(!console.controller().processing_enabled());
        console.run_line("bypass");
        assert!(console.controller().processing_enabled());
    }

    #[test]
    fn loop_commands_reach_the_path() {
        let (mut path, mut console) = fresh();
        console.run_line("rec");
        let mut out = [0i16; 4];
        path.process_block(&[5, 6, 7, 8], &mut out);
        console.run_line("stop-rec");
        console.run_line("loop");
        path.process_block(&[0, 0], &mut out[..2]);
        assert_eq!(out[..2], [5, 6]);
        assert_eq!(console.controller().loop_state(), LoopState::Playing);
    }

    #[test]
    fn save_then_load_rebuilds_chain() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chain.json");
        let (_path, mut console) = fresh();
        console.run_line("add Overdrive");
        console.run_line("add Basic Filter");
        console.run_line("set 1 Type HP");
        console.handle(Command::Save(file.clone())).unwrap();

        let (_other_path, mut other) = fresh();
        other.run_line("add Delay");
        other.handle(Command::Load(file)).unwrap();

        let names: Vec<_> = other.controller().effects().map(|(n, _)| n).collect();
        assert_eq!(names, ["Overdrive", "Basic Filter"]);
        let kind = other.controller().parameters(1).unwrap().get("Type").unwrap().get();
        assert_eq!(kind, ParamValue::Choice("HP".into()));
    }
}
