// src/driver/prefer.rs

use tracing::error;

use crate::driver::ProvisionId;

/// Number of directory separators in a canonical name.
pub(crate) fn file_depth(name: &str) -> usize {
    name.bytes().filter(|b| *b == b'/').count()
}

/// Length of the byte-wise common prefix of two canonical names.
pub(crate) fn common_prefix_length(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Pick the best provider for a requester whose source file has canonical
/// name `src_name`.
///
/// Preference order:
/// 1. longest common prefix with `src_name` (closer in the directory tree),
/// 2. shallowest directory depth,
/// 3. lexicographically smallest canonical name.
///
/// Two candidates with identical canonical names are an internal error;
/// one of them is still chosen, consistently. This is the only place that
/// condition is detected.
pub(crate) fn choose_preferred<'a>(
    src_name: &str,
    mut candidates: impl Iterator<Item = (ProvisionId, &'a str)>,
) -> Option<ProvisionId> {
    let (mut best, mut best_name) = candidates.next()?;
    let mut best_depth = file_depth(best_name);
    let mut best_prefix = common_prefix_length(src_name, best_name);

    for (candidate, name) in candidates {
        let prefix = common_prefix_length(src_name, name);
        if prefix < best_prefix {
            continue;
        }
        if prefix == best_prefix {
            let depth = file_depth(name);
            if depth > best_depth {
                continue;
            }
            if depth == best_depth {
                if name > best_name {
                    continue;
                }
                if name == best_name {
                    error!(name = %name, "two providers share a canonical name");
                    continue;
                }
            }
        }

        best = candidate;
        best_name = name;
        best_depth = file_depth(name);
        best_prefix = prefix;
    }

    Some(best)
}
