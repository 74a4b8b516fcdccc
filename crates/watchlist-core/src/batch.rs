use crate::identity::TrackedIdentity;

/// Ordered, non-empty chunk of tracked identities sized for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    identities: Vec<TrackedIdentity>,
}

impl Batch {
    pub fn identities(&self) -> &[TrackedIdentity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Length of the single-space join of this batch.
    pub fn joined_len(&self) -> usize {
        let separators = self.identities.len().saturating_sub(1);
        self.identities.iter().map(TrackedIdentity::len).sum::<usize>() + separators
    }

    /// Owned identity strings, in order, for building a command.
    pub fn to_strings(&self) -> Vec<String> {
        self.identities.iter().map(ToString::to_string).collect()
    }
}

/// Word-wrap `identities` into batches whose single-space join fits `limit`.
///
/// Breaks only between identities. An identity longer than `limit` gets a
/// batch of its own. Empty input yields no batches.
pub fn split_batches<'a, I>(identities: I, limit: usize) -> Vec<Batch>
where
    I: IntoIterator<Item = &'a TrackedIdentity>,
{
    let mut batches = Vec::new();
    let mut current: Vec<TrackedIdentity> = Vec::new();
    let mut current_len = 0usize;

    for identity in identities {
        let needed = if current.is_empty() {
            identity.len()
        } else {
            current_len + 1 + identity.len()
        };

        if !current.is_empty() && needed > limit {
            batches.push(Batch {
                identities: std::mem::take(&mut current),
            });
            current_len = identity.len();
        } else {
            current_len = needed;
        }
        current.push(identity.clone());
    }

    if !current.is_empty() {
        batches.push(Batch {
            identities: current,
        });
    }

    batches
}
