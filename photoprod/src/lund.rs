use crate::error::{GeneratorError, Result};
use crate::particle;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use vector::LorentzVector;

/// Writes events in the LUND text format: one header line per event, then one
/// 14-field line per particle.
pub struct LundWriter<W: Write> {
    out: W,
    n_events: usize,
}

impl LundWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<LundWriter<BufWriter<File>>> {
        let f = File::create(path)?;
        Ok(LundWriter::new(BufWriter::new(f)))
    }
}

impl<W: Write> LundWriter<W> {
    pub const DEFAULT_STATUS: i32 = 1;

    pub fn new(out: W) -> LundWriter<W> {
        LundWriter { out, n_events: 0 }
    }

    /// Number of events written so far.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Write one event. `vertices` must hold one production vertex per particle.
    ///
    /// Inconsistent input returns `GeneratorError::Consistency` before anything is
    /// written, so the caller can skip the event and carry on.
    pub fn write_event(
        &mut self,
        particles: &[LorentzVector<f64>],
        weight: f64,
        vertices: &[[f64; 3]],
        pids: Option<&[i32]>,
        status: Option<&[i32]>,
    ) -> Result<()> {
        if vertices.len() != particles.len() {
            return Err(GeneratorError::Consistency(format!(
                "{} vertices given for {} particles",
                vertices.len(),
                particles.len()
            )));
        }
        let pids = pids.ok_or_else(|| GeneratorError::Consistency("No PID array given".to_owned()))?;
        if pids.len() != particles.len() {
            return Err(GeneratorError::Consistency(format!(
                "{} PIDs given for {} particles",
                pids.len(),
                particles.len()
            )));
        }
        if let Some(status) = status {
            if status.len() != particles.len() {
                return Err(GeneratorError::Consistency(format!(
                    "{} status codes given for {} particles",
                    status.len(),
                    particles.len()
                )));
            }
        }
        let table = pids
            .iter()
            .map(|&pid| {
                particle::find_by_pdg(pid)
                    .ok_or_else(|| GeneratorError::Consistency(format!("Unknown PID {}", pid)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut text = format!("{} 0 0 0 0 0 0 0 0 {:.6e}\n", particles.len(), weight);
        for (i, (p, v)) in particles.iter().zip(vertices).enumerate() {
            let s = status.map_or(Self::DEFAULT_STATUS, |s| s[i]);
            text.push_str(&format!(
                "{} {} {} {} 0 0 {:.6} {:.6} {:.6} {:.6} {:.6} {:.4} {:.4} {:.4}\n",
                i + 1,
                table[i].charge,
                s,
                pids[i],
                p.x,
                p.y,
                p.z,
                p.t,
                table[i].mass,
                v[0],
                v[1],
                v[2]
            ));
        }

        self.out.write_all(text.as_bytes())?;
        self.n_events += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
