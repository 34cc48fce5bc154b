use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::pad::{Pad, PadCategory, PadId};
use crate::pattern::{DEFAULT_BPM, DEFAULT_LENGTH, DEFAULT_VELOCITY};
use crate::sample::FileFetcher;
use crate::sequencer::StepSequencer;

// ── Kit file ──────────────────────────────────────────────────────────────────

/// Starting values for a studio session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionDefaults {
    pub tempo_bpm:       f32,
    pub length_in_steps: usize,
    pub swing_amount:    f32,
    pub master_gain:     f32,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            tempo_bpm: DEFAULT_BPM,
            length_in_steps: DEFAULT_LENGTH,
            swing_amount: 0.0,
            master_gain: 0.8,
        }
    }
}

/// A pad entry in a kit file, optionally with a seed pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KitPad {
    #[serde(flatten)]
    pub pad: Pad,
    /// Step string, see `parse_steps`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<String>,
}

/// The pad catalog plus session defaults, as read from a JSON kit file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Kit {
    pub name: String,
    pub pads: Vec<KitPad>,
    #[serde(default)]
    pub session: SessionDefaults,
    /// Directory relative sample paths are resolved against.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Kit {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading kit file {}", path.display()))?;
        let mut kit: Kit = serde_json::from_str(&text)
            .with_context(|| format!("parsing kit file {}", path.display()))?;
        kit.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        kit.validate()?;
        Ok(kit)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pads.is_empty() {
            bail!("kit '{}' has no pads", self.name);
        }
        let mut seen = HashSet::new();
        for entry in &self.pads {
            let id = &entry.pad.id;
            if id.as_str().trim().is_empty() {
                bail!("kit '{}' has a pad with an empty id", self.name);
            }
            if !seen.insert(id) {
                bail!("kit '{}' lists pad '{}' twice", self.name, id);
            }
            if let Some(steps) = &entry.steps {
                parse_steps(steps).with_context(|| format!("pad '{id}' steps"))?;
            }
        }
        Ok(())
    }

    /// Eight synthesised pads with a basic beat.
    pub fn builtin() -> Self {
        let pad = |id: &str, category, steps: Option<&str>| KitPad {
            pad: Pad::synthesized(id, category),
            steps: steps.map(str::to_string),
        };
        Self {
            name: "builtin".to_string(),
            pads: vec![
                pad("kick",  PadCategory::Kick,    Some("X... .... X.x. ....")),
                pad("snare", PadCategory::Snare,   Some(".... X... .... X..o")),
                pad("chat",  PadCategory::HiHat,   Some("x.o.")),
                pad("ohat",  PadCategory::OpenHat, None),
                pad("clap",  PadCategory::Clap,    None),
                pad("tom",   PadCategory::Tom,     None),
                pad("crash", PadCategory::Crash,   None),
                pad("fx",    PadCategory::Effect,  None),
            ],
            session: SessionDefaults::default(),
            root: PathBuf::new(),
        }
    }

    pub fn pads(&self) -> Vec<Pad> {
        self.pads.iter().map(|p| p.pad.clone()).collect()
    }

    pub fn pad_ids(&self) -> Vec<PadId> {
        self.pads.iter().map(|p| p.pad.id.clone()).collect()
    }

    pub fn fetcher(&self) -> FileFetcher {
        FileFetcher::new(self.root.clone())
    }

    /// A stopped sequencer for this kit with the seed steps applied.
    pub fn build_sequencer(&self) -> anyhow::Result<StepSequencer> {
        let s = &self.session;
        let mut seq = StepSequencer::new(self.pad_ids(), s.length_in_steps, s.tempo_bpm)?;
        seq.set_swing(s.swing_amount)?;

        let length = seq.length();
        for entry in &self.pads {
            let Some(text) = &entry.steps else { continue };
            let seed = parse_steps(text)?;
            if seed.is_empty() {
                continue;
            }
            // shorter seeds repeat to fill the pattern
            for step in 0..length {
                if let Some(velocity) = seed[step % seed.len()] {
                    seq.set_step(&entry.pad.id, step, true)?;
                    seq.set_velocity(&entry.pad.id, step, velocity)?;
                }
            }
        }
        Ok(seq)
    }
}

/// Parse a step string: `X` = full hit, `x` = default velocity, `o` = ghost
/// (0.5), `.` or `-` = rest.  Whitespace and `|` are ignored.
pub fn parse_steps(text: &str) -> anyhow::Result<Vec<Option<f32>>> {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '|')
        .map(|c| match c {
            'X'       => Ok(Some(1.0)),
            'x'       => Ok(Some(DEFAULT_VELOCITY)),
            'o'       => Ok(Some(0.5)),
            '.' | '-' => Ok(None),
            other     => bail!("unexpected character '{other}' in step string"),
        })
        .collect()
}
