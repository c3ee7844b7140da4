//! Program-derived account addresses.
//!
//! Same seeds always give the same address, so the client and the program
//! agree on where a record lives without a lookup.

use solana_sdk::pubkey::Pubkey;

use crate::capture::ImageHash;

pub const PHOTO_SEED: &[u8] = b"photo";
pub const VOUCH_SEED: &[u8] = b"vouch";

/// Photo record address for `(creator, image_hash)`, with its bump seed.
pub fn photo_record_address(
    program_id: &Pubkey,
    creator: &Pubkey,
    image_hash: &ImageHash,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[PHOTO_SEED, creator.as_ref(), &image_hash.as_bytes()[..]],
        program_id,
    )
}

/// Vouch record address for `(voucher, photo_record)`, with its bump seed.
pub fn vouch_record_address(
    program_id: &Pubkey,
    voucher: &Pubkey,
    photo_record: &Pubkey,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[VOUCH_SEED, voucher.as_ref(), photo_record.as_ref()],
        program_id,
    )
}
