//! Deterministic melody mapping
//!
//! Pure functions from transaction data to musical content. Given the same
//! record fields and the same style profile, every function here returns the
//! same value on every call; nothing reads clocks or randomness.

use chimes_common::TxKind;

use super::style::StyleProfile;

/// Tempo floor in BPM
pub const MIN_BPM: f32 = 80.0;

/// Tempo ceiling in BPM
pub const MAX_BPM: f32 = 180.0;

/// Transaction count at which the tempo saturates
pub const THROUGHPUT_CEILING: u32 = 30;

/// Duration ceiling after fee scaling, in seconds
pub const MAX_DURATION_SECS: f32 = 6.0;

/// How many leading id characters feed the note hash
const ID_PREFIX_LEN: usize = 8;

/// Primary note for a transaction id: semitone offset from the profile base.
///
/// Sums the numeric value of each hexadecimal character in the first eight
/// characters of the id (other characters count zero). The sum selects a
/// scale degree; the quotient lifts the note at most one octave so the
/// register stays bounded.
pub fn primary_note(id: &str, profile: &StyleProfile) -> i32 {
    let sum: u32 = id
        .chars()
        .take(ID_PREFIX_LEN)
        .map(|c| c.to_digit(16).unwrap_or(0))
        .sum();

    let len = profile.scale.len() as u32;
    let scale_index = (sum % len) as usize;
    let octave_shift = ((sum / len) % 2) as i32;
    profile.scale[scale_index] + 12 * octave_shift
}

/// Equal-temperament frequency for a semitone offset from `base` Hz
pub fn frequency(base: f32, note: i32) -> f32 {
    base * 2.0_f32.powf(note as f32 / 12.0)
}

/// Harmony semitone offsets for an amount.
///
/// The first two fractional decimal digits of the amount (trailing zeros
/// trimmed) each pick a chord from the profile's table; the chosen chords
/// are unioned with duplicates removed, preserving first-appearance order.
/// An integral or zero amount falls back to the first chord alone.
pub fn harmony_offsets(amount: f64, profile: &StyleProfile) -> Vec<i32> {
    let table = &profile.chord_table;

    let mut digits: Vec<u32> = Vec::new();
    if amount > 0.0 {
        let frac = format!("{:.6}", amount.fract());
        // "0.250000" -> "25"
        let trimmed = frac[2..].trim_end_matches('0');
        digits = trimmed.chars().filter_map(|c| c.to_digit(10)).collect();
    }

    let mut offsets: Vec<i32> = Vec::new();
    if digits.is_empty() {
        offsets.extend(&table[0]);
    } else {
        for digit in digits.into_iter().take(2) {
            let chord = &table[digit as usize % table.len()];
            for &offset in chord {
                if !offsets.contains(&offset) {
                    offsets.push(offset);
                }
            }
        }
    }
    offsets
}

/// Base phrase duration per transaction kind, in seconds
pub fn base_duration_secs(kind: TxKind) -> f32 {
    match kind {
        TxKind::Payment => 2.5,
        TxKind::OfferCreate => 2.0,
        TxKind::OfferCancel => 2.0,
        TxKind::TrustSet => 3.5,
        TxKind::EscrowCreate => 4.0,
        TxKind::EscrowFinish => 4.5,
        TxKind::NftTokenMint => 3.0,
        TxKind::PaymentChannelCreate => 4.0,
        TxKind::Unknown => 3.0,
    }
}

/// Phrase duration: the per-kind base stretched by the fee, capped at 6 s
pub fn duration_secs(kind: TxKind, fee: u64) -> f32 {
    let base = base_duration_secs(kind);
    let stretch = 1.0 + (fee.max(1) as f32).log10() / 20.0;
    (base * stretch).min(MAX_DURATION_SECS)
}

/// Kinds that add the percussive noise burst
pub fn has_percussion(kind: TxKind) -> bool {
    matches!(kind, TxKind::Payment | TxKind::EscrowFinish)
}

/// Highpass cutoff for the percussive burst, rising with the fee
pub fn percussion_cutoff_hz(fee: u64) -> f32 {
    let cutoff = 2000.0 + (fee.max(1) as f32).log10() * 800.0;
    cutoff.min(8000.0)
}

/// Throughput-derived tempo: a reported metric only, never a scheduling gate
pub fn tempo_bpm(tx_count: u32, min_bpm: f32, max_bpm: f32, ceiling: u32) -> f32 {
    let capped = tx_count.min(ceiling.max(1)) as f32;
    min_bpm + (capped / ceiling.max(1) as f32) * (max_bpm - min_bpm)
}
