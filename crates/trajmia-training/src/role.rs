//! Roles, splits and views addressing the data blocks of a corpus.

use crate::error::TrainingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Purpose assigned to a disjoint data block and to the model trained on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Target,
    Shadow,
    Distill,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Target, Self::Shadow, Self::Distill];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Target => 0,
            Self::Shadow => 1,
            Self::Distill => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Shadow => "shadow",
            Self::Distill => "distill",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| TrainingError::Configuration(format!("unknown role: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Self; 2] = [Self::Train, Self::Test];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Train => 0,
            Self::Test => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preprocessing applied to a corpus: deterministic or stochastic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Canonical,
    Augmented,
}

impl View {
    pub const ALL: [Self; 2] = [Self::Canonical, Self::Augmented];

    #[must_use]
    pub const fn from_augmented(augmented: bool) -> Self {
        if augmented { Self::Augmented } else { Self::Canonical }
    }

    #[must_use]
    pub const fn is_augmented(self) -> bool {
        matches!(self, Self::Augmented)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Canonical => 0,
            Self::Augmented => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Augmented => "augmented",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model a training run produces.
///
/// Direct runs train on their own role's blocks; distillation runs train a
/// student on the distill blocks against a teacher of the named role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Target,
    Shadow,
    DistillTarget,
    DistillShadow,
}

impl RunKind {
    pub const ALL: [Self; 4] = [Self::Target, Self::Shadow, Self::DistillTarget, Self::DistillShadow];

    /// The run that trains a model of `role` directly, if any.
    #[must_use]
    pub const fn direct(role: Role) -> Option<Self> {
        match role {
            Role::Target => Some(Self::Target),
            Role::Shadow => Some(Self::Shadow),
            Role::Distill => None,
        }
    }

    /// Role whose data blocks this run trains and evaluates on.
    #[must_use]
    pub const fn data_role(self) -> Role {
        match self {
            Self::Target => Role::Target,
            Self::Shadow => Role::Shadow,
            Self::DistillTarget | Self::DistillShadow => Role::Distill,
        }
    }

    /// Role of the frozen teacher for distillation runs.
    #[must_use]
    pub const fn teacher_role(self) -> Option<Role> {
        match self {
            Self::Target | Self::Shadow => None,
            Self::DistillTarget => Some(Role::Target),
            Self::DistillShadow => Some(Role::Shadow),
        }
    }

    #[must_use]
    pub const fn is_distillation(self) -> bool {
        self.teacher_role().is_some()
    }

    /// Mode string, also used as the run's directory name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Shadow => "shadow",
            Self::DistillTarget => "distill_target",
            Self::DistillShadow => "distill_shadow",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunKind {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|run| run.as_str() == s)
            .ok_or_else(|| TrainingError::Configuration(format!("unknown run mode: {s}")))
    }
}
