//! Channel transformation definitions.
//!
//! A workspace declares the display scale of each channel as one of a small
//! set of parametrized functions. Only the definitions are modelled here; the
//! definitions are shared across samples through a [`TransformationSet`], which
//! interns them by key so a scale used by many samples is stored once.

use crate::error::{GateError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// The transformation families a workspace can declare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum TransformationKind {
    Linear,
    Log,
    Logicle,
    /// FlowJo's biexponential
    Biex,
    /// FlowJo's arcsinh
    Fasinh,
    Hyperlog,
}

/// A parametrized channel transformation.
///
/// Defaults match what FlowJo writes when an attribute is left out:
/// 18-bit top of scale (262144), 4.5 positive decades, width basis 0.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transformation {
    Linear {
        min: f64,
        max: f64,
        gain: f64,
    },
    Log {
        offset: f64,
        decades: f64,
    },
    /// Parks-Moore logicle
    Logicle {
        top_of_scale: f64,
        width: f64,
        positive_decades: f64,
        negative_decades: f64,
    },
    Biex {
        /// Number of output channels
        length: f64,
        max_range: f64,
        negative: f64,
        width: f64,
        positive: f64,
    },
    Fasinh {
        top_of_scale: f64,
        positive_decades: f64,
        negative_decades: f64,
    },
    Hyperlog {
        top_of_scale: f64,
        width: f64,
        positive_decades: f64,
        negative_decades: f64,
    },
}

impl Transformation {
    /// The definition FlowJo assumes for a kind when no parameters are given.
    pub fn default_for(kind: TransformationKind) -> Self {
        match kind {
            TransformationKind::Linear => Transformation::Linear {
                min: 0.0,
                max: 262144.0,
                gain: 1.0,
            },
            TransformationKind::Log => Transformation::Log {
                offset: 1.0,
                decades: 4.5,
            },
            TransformationKind::Logicle => Transformation::Logicle {
                top_of_scale: 262144.0,
                width: 0.5,
                positive_decades: 4.5,
                negative_decades: 0.0,
            },
            TransformationKind::Biex => Transformation::Biex {
                length: 256.0,
                max_range: 262144.0,
                negative: 0.0,
                width: -10.0,
                positive: 4.418539922,
            },
            TransformationKind::Fasinh => Transformation::Fasinh {
                top_of_scale: 262144.0,
                positive_decades: 4.5,
                negative_decades: 0.0,
            },
            TransformationKind::Hyperlog => Transformation::Hyperlog {
                top_of_scale: 262144.0,
                width: 0.5,
                positive_decades: 4.5,
                negative_decades: 0.0,
            },
        }
    }

    pub fn kind(&self) -> TransformationKind {
        match self {
            Transformation::Linear { .. } => TransformationKind::Linear,
            Transformation::Log { .. } => TransformationKind::Log,
            Transformation::Logicle { .. } => TransformationKind::Logicle,
            Transformation::Biex { .. } => TransformationKind::Biex,
            Transformation::Fasinh { .. } => TransformationKind::Fasinh,
            Transformation::Hyperlog { .. } => TransformationKind::Hyperlog,
        }
    }

    fn parameters(&self) -> Vec<(&'static str, f64)> {
        match *self {
            Transformation::Linear { min, max, gain } => {
                vec![("min", min), ("max", max), ("gain", gain)]
            }
            Transformation::Log { offset, decades } => {
                vec![("offset", offset), ("decades", decades)]
            }
            Transformation::Logicle {
                top_of_scale,
                width,
                positive_decades,
                negative_decades,
            }
            | Transformation::Hyperlog {
                top_of_scale,
                width,
                positive_decades,
                negative_decades,
            } => vec![
                ("T", top_of_scale),
                ("W", width),
                ("M", positive_decades),
                ("A", negative_decades),
            ],
            Transformation::Biex {
                length,
                max_range,
                negative,
                width,
                positive,
            } => vec![
                ("length", length),
                ("maxRange", max_range),
                ("neg", negative),
                ("width", width),
                ("pos", positive),
            ],
            Transformation::Fasinh {
                top_of_scale,
                positive_decades,
                negative_decades,
            } => vec![
                ("T", top_of_scale),
                ("M", positive_decades),
                ("A", negative_decades),
            ],
        }
    }

    /// Check the parameters lie in the domain of the function.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind().to_string();
        if let Some((name, value)) = self.parameters().into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(GateError::invalid_transformation(
                kind,
                format!("{} is not finite ({})", name, value),
            ));
        }

        let fail = |message: String| -> Result<()> {
            Err(GateError::invalid_transformation(kind.clone(), message))
        };

        match *self {
            Transformation::Linear { min, max, .. } if max <= min => {
                fail(format!("max {} must exceed min {}", max, min))
            }
            Transformation::Log { offset, decades } if offset <= 0.0 || decades <= 0.0 => fail(
                format!("offset {} and decades {} must be positive", offset, decades),
            ),
            Transformation::Logicle {
                top_of_scale: t,
                width: w,
                positive_decades: m,
                negative_decades: a,
            }
            | Transformation::Hyperlog {
                top_of_scale: t,
                width: w,
                positive_decades: m,
                negative_decades: a,
            } => {
                if t <= 0.0 || m <= 0.0 {
                    fail(format!("T={} and M={} must be positive", t, m))
                } else if w < 0.0 || 2.0 * w > m {
                    fail(format!("W={} must lie in [0, M/2] for M={}", w, m))
                } else if a < -w || a > m - 2.0 * w {
                    fail(format!("A={} must lie in [-W, M-2W] for W={}, M={}", a, w, m))
                } else {
                    Ok(())
                }
            }
            Transformation::Biex {
                length,
                max_range,
                positive,
                ..
            } if length <= 0.0 || max_range <= 0.0 || positive <= 0.0 => fail(format!(
                "length {}, maxRange {} and pos {} must be positive",
                length, max_range, positive
            )),
            Transformation::Fasinh {
                top_of_scale,
                positive_decades,
                ..
            } if top_of_scale <= 0.0 || positive_decades <= 0.0 => fail(format!(
                "T={} and M={} must be positive",
                top_of_scale, positive_decades
            )),
            _ => Ok(()),
        }
    }
}

/// Canonical rendering, e.g. `logicle(T=262144,W=0.5,M=4.5,A=0)`.
/// Used as the interning key for transformations declared without an id.
impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind())?;
        for (idx, (name, value)) in self.parameters().into_iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str(")")
    }
}

/// Transformations shared by every sample of a gating set, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransformationSet {
    entries: IndexMap<Arc<str>, Transformation>,
}

impl TransformationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `transformation` and return the key it is known by.
    ///
    /// The key is `id` when given, otherwise the canonical rendering of the
    /// definition. Re-interning an identical definition returns the existing
    /// key; binding an id to a different definition is an error.
    pub fn intern(&mut self, id: Option<&str>, transformation: Transformation) -> Result<Arc<str>> {
        transformation.validate()?;

        let key: Arc<str> = match id {
            Some(id) => Arc::from(id),
            None => Arc::from(transformation.to_string()),
        };

        match self.entries.get_key_value(&key) {
            Some((existing_key, existing)) if *existing == transformation => Ok(existing_key.clone()),
            Some((_, existing)) => Err(GateError::TransformationConflict {
                id: key.to_string(),
                existing: existing.to_string(),
                incoming: transformation.to_string(),
            }),
            None => {
                self.entries.insert(key.clone(), transformation);
                Ok(key)
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Transformation> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Transformation)> {
        self.entries.iter()
    }

    /// Fold another set into this one, with the same conflict rules as [`intern`](Self::intern).
    pub fn merge(&mut self, other: TransformationSet) -> Result<()> {
        for (key, transformation) in other.entries {
            match self.entries.get(&key) {
                Some(existing) if *existing != transformation => {
                    return Err(GateError::TransformationConflict {
                        id: key.to_string(),
                        existing: existing.to_string(),
                        incoming: transformation.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    self.entries.insert(key, transformation);
                }
            }
        }
        Ok(())
    }
}
