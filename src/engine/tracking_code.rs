use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

const TRACKING_PREFIX: &str = "TRK";
const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_SUFFIX_LEN: usize = 6;
const BARCODE_LEN: usize = 12;

/// `TRK` + last six digits of the Unix millis + six random base-36 chars.
pub fn generate_tracking_id() -> String {
    let millis = Utc::now().timestamp_millis().unsigned_abs() % 1_000_000;
    format!(
        "{TRACKING_PREFIX}{millis:06}{}",
        random_base36(RANDOM_SUFFIX_LEN)
    )
}

pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Random numeric barcode; carries no relation to the tracking id.
pub fn generate_barcode() -> String {
    let mut rng = rand::thread_rng();
    (0..BARCODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Data-URI payload for rendering the tracking id as a QR code.
pub fn qr_payload(tracking_id: &str) -> String {
    format!("data:text/plain;base64,{}", STANDARD.encode(tracking_id))
}

pub fn decode_qr_payload(payload: &str) -> Option<String> {
    let encoded = payload.strip_prefix("data:text/plain;base64,")?;
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Claims a fresh tracking id for `parcel_id` in the uniqueness index,
/// regenerating on collision up to `max_attempts` times.
///
/// Returns the claimed id and how many collisions were hit on the way.
pub fn reserve_tracking_id(
    index: &DashMap<String, Uuid>,
    parcel_id: Uuid,
    max_attempts: u32,
    mut generate: impl FnMut() -> String,
) -> Result<(String, u32), AppError> {
    let mut collisions = 0;

    for attempt in 1..=max_attempts.max(1) {
        let candidate = generate();
        match index.entry(candidate) {
            Entry::Vacant(slot) => {
                let tracking_id = slot.key().clone();
                slot.insert(parcel_id);
                return Ok((tracking_id, collisions));
            }
            Entry::Occupied(taken) => {
                collisions += 1;
                warn!(
                    tracking_id = %taken.key(),
                    attempt,
                    "tracking id collision; regenerating"
                );
            }
        }
    }

    Err(AppError::Conflict(format!(
        "could not allocate a unique tracking id after {} attempts",
        max_attempts.max(1)
    )))
}
