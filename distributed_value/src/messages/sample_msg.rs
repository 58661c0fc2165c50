//! Samples sent by search workers.

use crate::core::State;
use crate::transport::Payload;

/// Leading scalar of every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum SampleTag {
    Experience = 0,
    Verification = 1,
}

impl TryFrom<i64> for SampleTag {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SampleTag::Experience),
            1 => Ok(SampleTag::Verification),
            other => Err(other),
        }
    }
}

/// A worker expanded `prestate` with `action` and reached `poststates`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceSample {
    /// State the worker was in.
    pub prestate: State,
    pub action: i64,
    /// Possible results of `action`; may be empty.
    pub poststates: Vec<State>,
}

/// A worker solved `state` in `target_steps` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSample {
    pub state: State,
    /// Known steps to the goal from `state`.
    pub target_steps: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleMsg {
    Experience(ExperienceSample),
    Verification(VerificationSample),
}

impl SampleMsg {
    /// Tag sent ahead of this sample.
    pub fn tag(&self) -> SampleTag {
        match self {
            SampleMsg::Experience(_) => SampleTag::Experience,
            SampleMsg::Verification(_) => SampleTag::Verification,
        }
    }

    /// The send sequence for this sample, tag first.
    pub fn into_payloads(self) -> Vec<Payload> {
        let mut out = vec![Payload::Scalar(self.tag() as i64)];
        match self {
            SampleMsg::Experience(sample) => {
                out.reserve(3 + sample.poststates.len());
                out.push(Payload::Vector(sample.prestate.into_inner()));
                out.push(Payload::Scalar(sample.action));
                out.push(Payload::Scalar(sample.poststates.len() as i64));
                out.extend(
                    sample
                        .poststates
                        .into_iter()
                        .map(|s| Payload::Vector(s.into_inner())),
                );
            }
            SampleMsg::Verification(sample) => {
                out.push(Payload::Vector(sample.state.into_inner()));
                out.push(Payload::Scalar(sample.target_steps as i64));
            }
        }
        out
    }
}

impl From<ExperienceSample> for SampleMsg {
    fn from(sample: ExperienceSample) -> Self {
        SampleMsg::Experience(sample)
    }
}

impl From<VerificationSample> for SampleMsg {
    fn from(sample: VerificationSample) -> Self {
        SampleMsg::Verification(sample)
    }
}
