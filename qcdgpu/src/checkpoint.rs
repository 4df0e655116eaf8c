// SPDX-License-Identifier: AGPL-3.0-only

//! Binary run state: a 64-word header followed by the payload.
//!
//! All words are little-endian u32. Doubles occupy two words, low half first.
//!
//! | Word | Field |
//! |------|-------|
//! | 0-1 | prefix `QCDGPU` |
//! | 2-3 | version |
//! | 4 | reserved by the format; used here for tensor variant, bit 8 TBC |
//! | 5 | initialized |
//! | 6 | start mode |
//! | 7-10 | PRNG series, kind, skip, counter |
//! | 11-15 | NAV, NAV counter, NITER, ITER, ITER counter |
//! | 16-19 | NHIT, Wilson R, Wilson T, precision |
//! | 20-25 | BETA, PHI, OMEGA |
//! | 26-28 | Polyakov level, tensor generator indices |
//! | 29-32 | tensor, actions, plaquettes, Wilson flags |
//! | 33-36 | scratch words, energies series, energies series with tensor columns, Polyakov series |
//! | 37-38 | group, nd |
//! | 39.. | full extents, part 0 extents, part count, remaining part widths |
//!
//! The plaquette series length is not stored: it is `2 · ITER` when the
//! plaquette flag is set.
//!
//! Payload: scratch of every part, then the energies, plaquette, Wilson and
//! Polyakov series (f64, enabled ones only), then the link table in global
//! site order without halo. Links are f64 in double precision and f32
//! otherwise.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{Precision, PrngKind, RunParameters, StartMode, TensorVariant};
use crate::constants::{CHECKPOINT_HEADER_WORDS, CHECKPOINT_PREFIX, CHECKPOINT_VERSION};
use crate::error::{QcdError, Result};
use crate::geometry::Geometry;
use crate::kernels::{words_per_link, MeasurementLayout, DIFF_AXES};
use crate::sublattice::Series;

const EXTENTS_AT: usize = 39;

/// Scalar state stored in the header.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointHeader {
    pub tensor: Option<TensorVariant>,
    pub tbc: bool,
    pub initialized: bool,
    pub start: StartMode,
    pub rand_series: u32,
    pub prng: PrngKind,
    pub prng_skip: u64,
    pub prng_counter: u64,
    pub nav: usize,
    pub nav_counter: usize,
    pub niter: usize,
    pub iter: usize,
    pub iter_counter: usize,
    pub nhit: usize,
    pub wilson_r: usize,
    pub wilson_t: usize,
    pub precision: Precision,
    pub beta: f64,
    pub phi: f64,
    pub omega: f64,
    pub pl_level: u32,
    pub tensor_indices: [usize; 2],
    pub get_actions: bool,
    pub get_plaquettes: bool,
    pub get_wilson: bool,
    pub scratch_len: usize,
    /// Energies words without the field-tensor columns.
    pub energies_plain_len: usize,
    /// Energies words as stored, tensor columns included.
    pub energies_len: usize,
    pub polyakov_len: usize,
    pub group: usize,
    pub full: Vec<usize>,
    /// Axis-0 width of every part.
    pub parts: Vec<usize>,
}

impl CheckpointHeader {
    /// Header of a fresh run; counters start at zero.
    #[must_use]
    pub fn new(p: &RunParameters, geometry: &Geometry, scratch_len: usize) -> Self {
        let layout = MeasurementLayout::from_params(p);
        Self {
            tensor: p.tensor,
            tbc: p.tbc,
            initialized: false,
            start: p.start,
            rand_series: p.rand_series,
            prng: p.prng,
            prng_skip: p.prng_skip,
            prng_counter: p.prng_skip,
            nav: p.nav,
            nav_counter: 0,
            niter: p.niter,
            iter: p.iter,
            iter_counter: 0,
            nhit: p.nhit,
            wilson_r: p.wilson_r,
            wilson_t: p.wilson_t,
            precision: p.precision,
            beta: p.beta,
            phi: p.phi,
            omega: p.omega,
            pl_level: p.pl_level,
            tensor_indices: p.tensor_indices(),
            get_actions: p.get_actions_avr,
            get_plaquettes: p.get_plaquettes_avr,
            get_wilson: p.get_wilson,
            scratch_len,
            energies_plain_len: p.iter * (layout.energies_width - layout.tensor_width()),
            energies_len: p.iter * layout.energies_width,
            polyakov_len: p.iter * layout.polyakov_width,
            group: p.group,
            full: geometry.full.clone(),
            parts: geometry.extents(),
        }
    }

    /// Number of words in the full link table.
    #[must_use]
    pub fn links_len(&self) -> usize {
        self.full.len() * self.full.iter().product::<usize>() * words_per_link(self.group)
    }

    /// Plaquette series words: spatial and temporal per iteration.
    #[must_use]
    pub const fn plaquettes_len(&self) -> usize {
        self.iter * 2
    }

    /// Series stored in the payload with their lengths, in payload order.
    #[must_use]
    pub fn series_lengths(&self) -> Vec<(Series, usize)> {
        let mut out = vec![(Series::Energies, self.energies_len)];
        if self.get_plaquettes {
            out.push((Series::Plaquettes, self.plaquettes_len()));
        }
        if self.get_wilson {
            out.push((Series::Wilson, self.iter));
        }
        if self.polyakov_len > 0 {
            out.push((Series::Polyakov, self.polyakov_len));
        }
        out
    }

    /// Reject a checkpoint whose lattice or measurement layout differs from
    /// the configured run; other parameter differences are logged.
    ///
    /// # Errors
    ///
    /// [`QcdError::Geometry`] for lattice or partition differences,
    /// [`QcdError::Checkpoint`] for a different measurement layout.
    pub fn verify(&self, p: &RunParameters, geometry: &Geometry) -> Result<()> {
        if self.group != p.group || self.full != geometry.full {
            return Err(QcdError::Geometry(format!(
                "checkpoint holds SU({}) on {:?}, run is SU({}) on {:?}",
                self.group, self.full, p.group, geometry.full
            )));
        }
        let parts = geometry.extents();
        let stored = self.parts.len().min(parts.len());
        if self.parts.len() != parts.len() || self.parts[..stored] != parts[..stored] {
            return Err(QcdError::Geometry(format!(
                "checkpoint partitions {:?}, run partitions {parts:?}",
                self.parts
            )));
        }
        let fresh = Self::new(p, geometry, self.scratch_len);
        if fresh.series_lengths() != self.series_lengths() || self.tensor != p.tensor {
            return Err(QcdError::Checkpoint(
                "measurement series differ from the configured run".into(),
            ));
        }
        if self.beta != p.beta || self.nhit != p.nhit || self.precision != p.precision {
            warn!(
                beta = self.beta,
                nhit = self.nhit,
                precision = ?self.precision,
                "checkpoint parameters differ from configuration, counters resume anyway"
            );
        }
        Ok(())
    }

    fn encode(&self) -> Result<[u32; CHECKPOINT_HEADER_WORDS]> {
        let nd = self.full.len();
        let mut w = [0u32; CHECKPOINT_HEADER_WORDS];
        pack_ascii(CHECKPOINT_PREFIX, &mut w[0..2]);
        pack_ascii(CHECKPOINT_VERSION, &mut w[2..4]);
        w[4] = TensorVariant::code(self.tensor) | (u32::from(self.tbc) << 8);
        w[5] = u32::from(self.initialized);
        w[6] = self.start.code();
        w[7] = self.rand_series;
        w[8] = self.prng.code();
        w[9] = word("PRNG skip", self.prng_skip)?;
        w[10] = word("PRNG counter", self.prng_counter)?;
        let counts = [
            self.nav,
            self.nav_counter,
            self.niter,
            self.iter,
            self.iter_counter,
            self.nhit,
            self.wilson_r,
            self.wilson_t,
        ];
        for (slot, v) in w[11..19].iter_mut().zip(counts) {
            *slot = word("counter", v as u64)?;
        }
        w[19] = self.precision.code();
        for (i, v) in [self.beta, self.phi, self.omega].into_iter().enumerate() {
            let bits = v.to_bits();
            w[20 + 2 * i] = bits as u32;
            w[21 + 2 * i] = (bits >> 32) as u32;
        }
        w[26] = self.pl_level;
        w[27] = word("tensor index", self.tensor_indices[0] as u64)?;
        w[28] = word("tensor index", self.tensor_indices[1] as u64)?;
        w[29] = u32::from(self.tensor.is_some());
        w[30] = u32::from(self.get_actions);
        w[31] = u32::from(self.get_plaquettes);
        w[32] = u32::from(self.get_wilson);
        w[33] = word("scratch size", self.scratch_len as u64)?;
        w[34] = word("series size", self.energies_plain_len as u64)?;
        w[35] = word("series size", self.energies_len as u64)?;
        w[36] = word("series size", self.polyakov_len as u64)?;
        w[37] = word("group", self.group as u64)?;
        w[38] = word("nd", nd as u64)?;

        let count_at = EXTENTS_AT + 2 * nd;
        if count_at >= CHECKPOINT_HEADER_WORDS || self.parts.is_empty() {
            return Err(QcdError::Checkpoint(format!(
                "{nd} dimensions do not fit the checkpoint header"
            )));
        }
        for (d, &l) in self.full.iter().enumerate() {
            w[EXTENTS_AT + d] = word("extent", l as u64)?;
            let domain = if d == 0 { self.parts[0] } else { l };
            w[EXTENTS_AT + nd + d] = word("extent", domain as u64)?;
        }
        w[count_at] = word("part count", self.parts.len() as u64)?;
        for (slot, &nx) in w[count_at + 1..].iter_mut().zip(&self.parts[1..]) {
            *slot = word("part width", nx as u64)?;
        }
        Ok(w)
    }

    fn decode(w: &[u32; CHECKPOINT_HEADER_WORDS], path: &Path) -> Result<Self> {
        let prefix = unpack_ascii(&w[0..2]);
        let version = unpack_ascii(&w[2..4]);
        if prefix != CHECKPOINT_PREFIX || version != CHECKPOINT_VERSION {
            return Err(QcdError::CheckpointMismatch {
                path: path.to_path_buf(),
                expected: format!("{CHECKPOINT_PREFIX} {CHECKPOINT_VERSION}"),
                found: format!("{prefix} {version}"),
            });
        }
        let bad = |what: &str| QcdError::Checkpoint(format!("{}: bad {what}", path.display()));
        let nd = w[38] as usize;
        let count_at = EXTENTS_AT + 2 * nd;
        if nd == 0 || count_at >= CHECKPOINT_HEADER_WORDS {
            return Err(bad("dimension count"));
        }
        let full: Vec<usize> = w[EXTENTS_AT..EXTENTS_AT + nd].iter().map(|&v| v as usize).collect();
        let count = w[count_at] as usize;
        if count == 0 {
            return Err(bad("part count"));
        }
        let mut parts = vec![w[EXTENTS_AT + nd] as usize];
        parts.extend(
            w[count_at + 1..]
                .iter()
                .take(count - 1)
                .map(|&v| v as usize),
        );
        if parts.len() < count {
            debug!(count, stored = parts.len(), "part widths truncated in header");
        }
        let tensor_on = w[29] != 0;
        let padding = if tensor_on { w[14] as usize * 2 * DIFF_AXES } else { 0 };
        if w[34] as usize + padding != w[35] as usize {
            return Err(bad("energies size"));
        }
        let double = |i: usize| f64::from_bits(u64::from(w[i]) | (u64::from(w[i + 1]) << 32));
        Ok(Self {
            tensor: if tensor_on {
                TensorVariant::from_code(w[4] & 0xff)
            } else {
                None
            },
            tbc: (w[4] >> 8) & 1 == 1,
            initialized: w[5] != 0,
            start: StartMode::from_code(w[6]).map_err(|_| bad("start mode"))?,
            rand_series: w[7],
            prng: PrngKind::from_code(w[8]).map_err(|_| bad("PRNG kind"))?,
            prng_skip: u64::from(w[9]),
            prng_counter: u64::from(w[10]),
            nav: w[11] as usize,
            nav_counter: w[12] as usize,
            niter: w[13] as usize,
            iter: w[14] as usize,
            iter_counter: w[15] as usize,
            nhit: w[16] as usize,
            wilson_r: w[17] as usize,
            wilson_t: w[18] as usize,
            precision: Precision::from_code(w[19]).map_err(|_| bad("precision"))?,
            beta: double(20),
            phi: double(22),
            omega: double(24),
            pl_level: w[26],
            tensor_indices: [w[27] as usize, w[28] as usize],
            get_actions: w[30] != 0,
            get_plaquettes: w[31] != 0,
            get_wilson: w[32] != 0,
            scratch_len: w[33] as usize,
            energies_plain_len: w[34] as usize,
            energies_len: w[35] as usize,
            polyakov_len: w[36] as usize,
            group: w[37] as usize,
            full,
            parts,
        })
    }
}

/// Complete saved state.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub header: CheckpointHeader,
    /// Scratch rows of every part, concatenated in part order.
    pub scratch: Vec<f64>,
    pub series: BTreeMap<Series, Vec<f64>>,
    /// Global link table, dir-major.
    pub links: Vec<f64>,
}

impl Checkpoint {
    /// Serialize header and payload.
    ///
    /// # Errors
    ///
    /// [`QcdError::Checkpoint`] if a value does not fit its word or a
    /// buffer length disagrees with the header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let h = &self.header;
        let header: Vec<u32> = h.encode()?.iter().map(|v| v.to_le()).collect();
        let mut out = Vec::new();
        out.extend_from_slice(bytemuck::cast_slice(&header));

        check_len("scratch", self.scratch.len(), h.scratch_len)?;
        push_f64(&mut out, &self.scratch);
        for (s, len) in h.series_lengths() {
            let data = self.series.get(&s).map_or(&[][..], Vec::as_slice);
            check_len(s.label(), data.len(), len)?;
            push_f64(&mut out, data);
        }
        check_len("links", self.links.len(), h.links_len())?;
        if h.precision.links_f64() {
            push_f64(&mut out, &self.links);
        } else {
            for &v in &self.links {
                out.extend_from_slice(&(v as f32).to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Parse bytes read from `path`.
    ///
    /// # Errors
    ///
    /// [`QcdError::CheckpointMismatch`] for a foreign prefix or version,
    /// [`QcdError::Checkpoint`] for a truncated or malformed file.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let mut r = Reader { bytes, at: 0, path };
        let mut words = [0u32; CHECKPOINT_HEADER_WORDS];
        for w in &mut words {
            *w = u32::from_le_bytes(r.take::<4>()?);
        }
        let header = CheckpointHeader::decode(&words, path)?;

        let scratch = r.f64s(header.scratch_len)?;
        let mut series = BTreeMap::new();
        for (s, len) in header.series_lengths() {
            series.insert(s, r.f64s(len)?);
        }
        let n = header.links_len();
        let links = if header.precision.links_f64() {
            r.f64s(n)?
        } else {
            (0..n)
                .map(|_| r.take::<4>().map(|b| f64::from(f32::from_le_bytes(b))))
                .collect::<Result<_>>()?
        };
        if r.at != bytes.len() {
            warn!(path = %path.display(), extra = bytes.len() - r.at, "trailing bytes after checkpoint payload");
        }
        Ok(Self {
            header,
            scratch,
            series,
            links,
        })
    }

    /// Write atomically: a temporary sibling is renamed over `path`.
    ///
    /// # Errors
    ///
    /// Encoding errors and [`QcdError::Io`].
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = temp_path(path);
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        info!(
            path = %path.display(),
            bytes = bytes.len(),
            iter = self.header.iter_counter,
            nav = self.header.nav_counter,
            "checkpoint saved"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// [`QcdError::Io`] and decoding errors.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let cp = Self::from_bytes(&bytes, path)?;
        info!(
            path = %path.display(),
            iter = cp.header.iter_counter,
            nav = cp.header.nav_counter,
            "checkpoint loaded"
        );
        Ok(cp)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn word(what: &str, v: u64) -> Result<u32> {
    u32::try_from(v).map_err(|_| QcdError::Checkpoint(format!("{what} {v} exceeds 32 bits")))
}

fn check_len(what: &str, found: usize, expected: usize) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(QcdError::Checkpoint(format!(
            "{what} holds {found} words, header says {expected}"
        )))
    }
}

fn push_f64(out: &mut Vec<u8>, data: &[f64]) {
    for v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn pack_ascii(s: &str, words: &mut [u32]) {
    let bytes = s.as_bytes();
    for (i, w) in words.iter_mut().enumerate() {
        let mut b = [0u8; 4];
        for (j, slot) in b.iter_mut().enumerate() {
            *slot = bytes.get(4 * i + j).copied().unwrap_or(0);
        }
        *w = u32::from_le_bytes(b);
    }
}

fn unpack_ascii(words: &[u32]) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).take_while(|&b| b != 0).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
    path: &'a Path,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let chunk = self
            .bytes
            .get(self.at..self.at + N)
            .ok_or_else(|| {
                QcdError::Checkpoint(format!(
                    "{} truncated at byte {} of {}",
                    self.path.display(),
                    self.at,
                    self.bytes.len()
                ))
            })?;
        self.at += N;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn f64s(&mut self, n: usize) -> Result<Vec<f64>> {
        (0..n).map(|_| self.take::<8>().map(f64::from_le_bytes)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::ParameterSet;

    fn state(text: &str, parts: usize) -> Checkpoint {
        let p = RunParameters::from_set(&ParameterSet::parse(text).expect("parse")).expect("params");
        let g = Geometry::split_even(p.extents.clone(), parts).expect("geometry");
        let mut header = CheckpointHeader::new(&p, &g, 12);
        header.initialized = true;
        header.nav_counter = 7;
        header.iter_counter = 3;
        header.prng_counter = 41;
        let series = header
            .series_lengths()
            .into_iter()
            .map(|(s, n)| (s, (0..n).map(|i| i as f64 * 0.125 + 1.0 / 3.0).collect()))
            .collect();
        let links = (0..header.links_len()).map(|i| (i as f64).sin()).collect();
        Checkpoint {
            header,
            scratch: (0..12).map(f64::from).collect(),
            series,
            links,
        }
    }

    #[test]
    fn double_round_trip_is_exact() {
        let cp = state("GROUP=2\nITER=5\nBETA=2.3\nPHI=0.1\nGETWILSON\nPL_LEVEL=2\n", 2);
        let bytes = cp.to_bytes().expect("encode");
        let back = Checkpoint::from_bytes(&bytes, Path::new("mem")).expect("decode");
        assert_eq!(back, cp);
        assert_eq!(back.header.beta.to_bits(), 2.3f64.to_bits());
    }

    #[test]
    fn single_precision_links_are_f32() {
        let cp = state("GROUP=2\nPRECISION=single\n", 1);
        let bytes = cp.to_bytes().expect("encode");
        let back = Checkpoint::from_bytes(&bytes, Path::new("mem")).expect("decode");
        for (a, b) in back.links.iter().zip(&cp.links) {
            assert_eq!(*a, f64::from(*b as f32));
        }
        assert_eq!(back.scratch, cp.scratch);
    }

    #[test]
    fn prefix_in_first_words() {
        let cp = state("GROUP=2\n", 1);
        let bytes = cp.to_bytes().expect("encode");
        assert_eq!(&bytes[..6], b"QCDGPU");
        assert_eq!(&bytes[8..11], CHECKPOINT_VERSION.as_bytes());
    }

    #[test]
    fn foreign_prefix_is_fatal() {
        let cp = state("GROUP=2\n", 1);
        let mut bytes = cp.to_bytes().expect("encode");
        bytes[0] = b'X';
        let err = Checkpoint::from_bytes(&bytes, Path::new("other.state")).expect_err("mismatch");
        assert!(matches!(err, QcdError::CheckpointMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn truncation_is_reported() {
        let cp = state("GROUP=2\n", 1);
        let bytes = cp.to_bytes().expect("encode");
        let err = Checkpoint::from_bytes(&bytes[..bytes.len() - 3], Path::new("cut")).expect_err("short");
        assert!(matches!(err, QcdError::Checkpoint(_)));
    }

    #[test]
    fn part_widths_survive() {
        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\nL1=8\n").expect("parse"))
            .expect("params");
        let g = Geometry::new(p.extents.clone(), &[2, 4, 2]).expect("geometry");
        let h = CheckpointHeader::new(&p, &g, 0);
        let words = h.encode().expect("encode");
        let back = CheckpointHeader::decode(&words, Path::new("mem")).expect("decode");
        assert_eq!(back.parts, vec![2, 4, 2]);
        back.verify(&p, &g).expect("same run");
        let other = Geometry::split_even(p.extents.clone(), 2).expect("geometry");
        assert!(matches!(back.verify(&p, &other), Err(QcdError::Geometry(_))));
    }

    #[test]
    fn energies_sizes_with_and_without_tensor() {
        let p = RunParameters::from_set(
            &ParameterSet::parse("GROUP=2\nITER=5\nGETACTIONS\nFMUNU\n").expect("parse"),
        )
        .expect("params");
        let g = Geometry::split_even(p.extents.clone(), 1).expect("geometry");
        let words = CheckpointHeader::new(&p, &g, 0).encode().expect("encode");
        assert_eq!(words[34], 5 * (2 + 2 * DIFF_AXES) as u32);
        assert_eq!(words[35], 5 * (2 + 4 * DIFF_AXES) as u32);

        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\nITER=5\nTURNOFFFMUNU\n").expect("parse"))
            .expect("params");
        let words = CheckpointHeader::new(&p, &g, 0).encode().expect("encode");
        assert_eq!((words[34], words[35]), (10, 10));

        let mut bad = words;
        bad[35] = 11;
        assert!(matches!(
            CheckpointHeader::decode(&bad, Path::new("mem")),
            Err(QcdError::Checkpoint(_))
        ));
    }

    #[test]
    fn word_four_carries_tensor_variant_and_twist_bit() {
        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\nF0MU\nTBC\n").expect("parse"))
            .expect("params");
        let g = Geometry::split_even(p.extents.clone(), 1).expect("geometry");
        let words = CheckpointHeader::new(&p, &g, 0).encode().expect("encode");
        assert_eq!(words[4], 2 | (1 << 8));
        let back = CheckpointHeader::decode(&words, Path::new("mem")).expect("decode");
        assert_eq!(back.tensor, Some(TensorVariant::Electric));
        assert!(back.tbc);

        let p = RunParameters::from_set(&ParameterSet::parse("GROUP=2\nTURNOFFFMUNU\n").expect("parse"))
            .expect("params");
        let words = CheckpointHeader::new(&p, &g, 0).encode().expect("encode");
        assert_eq!(words[4], 0);
    }

    #[test]
    fn atomic_save_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.state");
        let cp = state("GROUP=2\n", 1);
        cp.save(&path).expect("save");
        assert!(!temp_path(&path).exists());
        assert_eq!(Checkpoint::load(&path).expect("load"), cp);
    }
}
