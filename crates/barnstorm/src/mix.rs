//! Helpers for mix-sweep results, whose artifacts are named by their
//! interpolation point (`mix_a0.25.mid`, `mix_a1.00.mid`, ...).

use crate::api::Artifact;

const INTERIOR: [f64; 3] = [0.25, 0.5, 0.75];
const EPS: f64 = 1e-6;

/// Interpolation point encoded in a mix artifact's filename.
pub fn parse_alpha_from_filename(name: &str) -> Option<f64> {
    let lower = name.to_ascii_lowercase();
    let start = lower.find("mix_a")? + "mix_a".len();
    let rest = lower[start..].trim_start();

    let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if int_len == 0 {
        return None;
    }
    let mut end = int_len;
    let after = &rest.as_bytes()[int_len..];
    if after.first() == Some(&b'.') {
        let frac_len = after[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if frac_len > 0 {
            end += 1 + frac_len;
        }
    }

    rest[..end].parse().ok().filter(|v: &f64| v.is_finite())
}

/// The strictly interior points of a sweep (0.25, 0.5, 0.75), ascending.
///
/// The endpoints reproduce the inputs and are left out.
pub fn interior_alphas(artifacts: &[Artifact]) -> Vec<(f64, Artifact)> {
    let mut picked: Vec<(f64, Artifact)> = artifacts
        .iter()
        .filter_map(|a| {
            let alpha = parse_alpha_from_filename(&a.filename)?;
            INTERIOR
                .iter()
                .any(|want| (alpha - want).abs() < EPS)
                .then(|| (alpha, a.clone()))
        })
        .collect();
    picked.sort_by(|a, b| a.0.total_cmp(&b.0));
    picked
}
