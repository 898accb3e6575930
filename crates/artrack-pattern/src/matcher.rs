//! Nearest-template identification, optionally inside a PCA eigenspace.

use nalgebra::{DMatrix, DVector, DVectorView};
use serde::{Deserialize, Serialize};

use crate::template::{normalize_into, TemplatePattern};

/// Template matching parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateParams {
    /// Compare in the eigenspace of all registered variants.
    pub use_pca: bool,
    /// Fraction of variance the eigenspace keeps.
    pub pca_energy: f64,
    /// Upper bound on eigenspace dimension.
    pub max_components: usize,
    /// Also accept black/white-swapped templates.
    pub allow_inverted: bool,
    /// Matches below this cosine similarity are discarded.
    pub min_confidence: f64,
}

impl Default for TemplateParams {
    fn default() -> Self {
        Self {
            use_pca: true,
            pca_energy: 0.9,
            max_components: 10,
            allow_inverted: false,
            min_confidence: 0.5,
        }
    }
}

/// A template identification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemplateMatch {
    pub id: u32,
    /// `k` such that the sample equals the template turned `k` times clockwise.
    pub direction: u8,
    pub confidence: f64,
    pub inverted: bool,
}

/// Principal subspace of the registered template variants.
#[derive(Clone, Debug)]
pub struct Eigenspace {
    /// `components × dim`
    basis: DMatrix<f32>,
    energy: f64,
}

impl Eigenspace {
    /// Leading left singular vectors of the stacked `vectors`, kept until
    /// `energy` of the total is covered or `max_components` is reached.
    pub fn build(vectors: &[&[f32]], energy: f64, max_components: usize) -> Option<Self> {
        let dim = vectors.first()?.len();
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            return None;
        }
        let m = DMatrix::<f64>::from_fn(dim, vectors.len(), |r, c| vectors[c][r] as f64);
        let svd = m.svd(true, false);
        let u = svd.u?;

        let sv = &svd.singular_values;
        let mut order: Vec<usize> = (0..sv.len()).collect();
        order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));
        let total: f64 = sv.iter().map(|s| s * s).sum();
        if total <= 0.0 {
            return None;
        }

        let mut kept = Vec::new();
        let mut covered = 0.0;
        for &i in &order {
            if kept.len() >= max_components.max(1) || covered >= energy * total {
                break;
            }
            covered += sv[i] * sv[i];
            kept.push(i);
        }

        let basis = DMatrix::<f32>::from_fn(kept.len(), dim, |r, c| u[(c, kept[r])] as f32);
        Some(Self {
            basis,
            energy: covered / total,
        })
    }

    #[inline]
    pub fn components(&self) -> usize {
        self.basis.nrows()
    }

    /// Fraction of the variants' energy captured by the basis.
    #[inline]
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// `out` must have [`Self::components`] rows.
    pub fn project_into(&self, v: &[f32], out: &mut DVector<f32>) {
        let v = DVectorView::from_slice(v, v.len());
        out.gemv(1.0, &self.basis, &v, 0.0);
    }

    pub fn project(&self, v: &[f32]) -> DVector<f32> {
        let mut out = DVector::zeros(self.components());
        self.project_into(v, &mut out);
        out
    }
}

#[derive(Clone, Debug)]
struct Entry {
    id: u32,
    /// Normalized variants in either pixel space or eigenspace.
    variants: [DVector<f32>; 4],
}

/// Matches samples against every registered template.
#[derive(Clone, Debug)]
pub struct TemplateMatcher {
    size: usize,
    params: TemplateParams,
    eigenspace: Option<Eigenspace>,
    entries: Vec<Entry>,
    sample: Vec<f32>,
    projected: DVector<f32>,
}

impl TemplateMatcher {
    pub fn new(size: usize, params: TemplateParams) -> Self {
        Self {
            size,
            params,
            eigenspace: None,
            entries: Vec::new(),
            sample: Vec::with_capacity(size * size),
            projected: DVector::zeros(0),
        }
    }

    #[inline]
    pub fn params(&self) -> &TemplateParams {
        &self.params
    }

    #[inline]
    pub fn eigenspace(&self) -> Option<&Eigenspace> {
        self.eigenspace.as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the eigenspace and projections for `patterns`.
    ///
    /// Templates whose size differs from the matcher's are skipped.
    pub fn rebuild<'a>(&mut self, patterns: impl IntoIterator<Item = (u32, &'a TemplatePattern)>) {
        let patterns: Vec<_> = patterns
            .into_iter()
            .filter(|(id, t)| {
                let ok = t.size() == self.size;
                if !ok {
                    log::warn!("template {id} is {0}x{0}, matcher expects {1}x{1}", t.size(), self.size);
                }
                ok
            })
            .collect();

        self.eigenspace = None;
        if self.params.use_pca && !patterns.is_empty() {
            let all: Vec<&[f32]> = patterns
                .iter()
                .flat_map(|(_, t)| (0..4).map(move |k| t.variant(k)))
                .collect();
            self.eigenspace = Eigenspace::build(
                &all,
                self.params.pca_energy,
                self.params.max_components,
            );
            if let Some(es) = &self.eigenspace {
                log::debug!(
                    "eigenspace: {} components, {:.1}% energy over {} templates",
                    es.components(),
                    es.energy() * 100.0,
                    patterns.len()
                );
            }
        }

        let es = self.eigenspace.as_ref();
        self.entries = patterns
            .iter()
            .map(|&(id, t)| Entry {
                id,
                variants: [0, 1, 2, 3].map(|k| match es {
                    Some(es) => es.project(t.variant(k)),
                    None => DVector::from_column_slice(t.variant(k)),
                }),
            })
            .collect();
        self.projected = DVector::zeros(es.map_or(self.size * self.size, Eigenspace::components));
    }

    /// Best template for a `size × size` grey sample, if any clears
    /// `min_confidence`.
    pub fn identify(&mut self, sample: &[u8]) -> Option<TemplateMatch> {
        if self.entries.is_empty()
            || sample.len() != self.size * self.size
            || !normalize_into(sample, &mut self.sample)
        {
            return None;
        }
        match &self.eigenspace {
            Some(es) => es.project_into(&self.sample, &mut self.projected),
            None => self.projected.copy_from_slice(&self.sample),
        }
        let norm = self.projected.norm();
        if norm < 1e-6 {
            return None;
        }

        let mut best: Option<TemplateMatch> = None;
        for e in &self.entries {
            for (k, v) in e.variants.iter().enumerate() {
                let vn = v.norm();
                if vn < 1e-6 {
                    continue;
                }
                let cos = (self.projected.dot(v) / (norm * vn)) as f64;
                let (confidence, inverted) = if self.params.allow_inverted && -cos > cos {
                    (-cos, true)
                } else {
                    (cos, false)
                };
                if best.is_none_or(|b| confidence > b.confidence) {
                    best = Some(TemplateMatch {
                        id: e.id,
                        direction: k as u8,
                        confidence,
                        inverted,
                    });
                }
            }
        }
        best.filter(|b| b.confidence >= self.params.min_confidence)
    }
}
