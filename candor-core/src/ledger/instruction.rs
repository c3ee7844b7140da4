//! Candor program instructions.
//!
//! Layouts are fixed by the deployed program (Anchor encoding):
//!
//! | instruction    | data                                                              |
//! |----------------|-------------------------------------------------------------------|
//! | `verify_photo` | disc[8] ‖ image_hash[32] ‖ lat i64le ‖ lon i64le ‖ timestamp i64le |
//! | `vouch`        | disc[8] ‖ amount u64le                                             |
//!
//! Coordinates are fixed-point degrees scaled by 1e7.

use serde::Serialize;
use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;

use super::address::{photo_record_address, vouch_record_address};
use super::BlockRef;
use crate::capture::{CaptureMetadata, ImageHash};

/// `sha256("global:verify_photo")[..8]`
pub const VERIFY_PHOTO_DISCRIMINATOR: [u8; 8] = [0xa6, 0x53, 0x75, 0xc7, 0xc3, 0x30, 0xad, 0x44];

/// `sha256("global:vouch")[..8]`
pub const VOUCH_DISCRIMINATOR: [u8; 8] = [0x57, 0xf0, 0x08, 0x15, 0xdb, 0xb3, 0xf2, 0xb1];

pub const VERIFY_PHOTO_DATA_LEN: usize = 8 + 32 + 8 + 8 + 8;
pub const VOUCH_DATA_LEN: usize = 8 + 8;

/// Fixed-point scale for coordinates.
pub const COORDINATE_SCALE: f64 = 1e7;

/// Anchor instruction discriminator for a global instruction name.
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&digest[..8]);
    discriminator
}

/// Degrees to the program's fixed-point representation.
pub fn to_fixed_point(degrees: f64) -> i64 {
    (degrees * COORDINATE_SCALE).round() as i64
}

/// What the caller wants recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerIntent {
    VerifyPhoto {
        #[serde(serialize_with = "crate::record::serialize_pubkey")]
        creator: Pubkey,
        image_hash: ImageHash,
        latitude_e7: i64,
        longitude_e7: i64,
        timestamp: i64,
    },
    Vouch {
        #[serde(serialize_with = "crate::record::serialize_pubkey")]
        voucher: Pubkey,
        #[serde(serialize_with = "crate::record::serialize_pubkey")]
        creator: Pubkey,
        #[serde(serialize_with = "crate::record::serialize_pubkey")]
        photo_record: Pubkey,
        amount_lamports: u64,
    },
}

impl LedgerIntent {
    /// Verification intent for a sealed capture. A missing location encodes
    /// as zero coordinates.
    pub fn verify_photo(creator: Pubkey, metadata: &CaptureMetadata) -> Self {
        let (latitude, longitude) = metadata
            .location()
            .map(|l| (l.latitude(), l.longitude()))
            .unwrap_or((0.0, 0.0));

        Self::VerifyPhoto {
            creator,
            image_hash: *metadata.image_hash(),
            latitude_e7: to_fixed_point(latitude),
            longitude_e7: to_fixed_point(longitude),
            timestamp: metadata.timestamp(),
        }
    }

    pub fn vouch(voucher: Pubkey, creator: Pubkey, photo_record: Pubkey, amount_lamports: u64) -> Self {
        Self::Vouch {
            voucher,
            creator,
            photo_record,
            amount_lamports,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerifyPhoto { .. } => "verify_photo",
            Self::Vouch { .. } => "vouch",
        }
    }

    /// The signer paying fees: creator for verification, voucher for vouch.
    pub fn fee_payer(&self) -> Pubkey {
        match self {
            Self::VerifyPhoto { creator, .. } => *creator,
            Self::Vouch { voucher, .. } => *voucher,
        }
    }

    /// Instruction data, byte-exact with the program's layout.
    pub fn data(&self) -> Vec<u8> {
        match self {
            Self::VerifyPhoto {
                image_hash,
                latitude_e7,
                longitude_e7,
                timestamp,
                ..
            } => {
                let mut data = Vec::with_capacity(VERIFY_PHOTO_DATA_LEN);
                data.extend_from_slice(&VERIFY_PHOTO_DISCRIMINATOR);
                data.extend_from_slice(image_hash.as_bytes());
                data.extend_from_slice(&latitude_e7.to_le_bytes());
                data.extend_from_slice(&longitude_e7.to_le_bytes());
                data.extend_from_slice(&timestamp.to_le_bytes());
                data
            }
            Self::Vouch {
                amount_lamports, ..
            } => {
                let mut data = Vec::with_capacity(VOUCH_DATA_LEN);
                data.extend_from_slice(&VOUCH_DISCRIMINATOR);
                data.extend_from_slice(&amount_lamports.to_le_bytes());
                data
            }
        }
    }

    /// Instruction with the account list the program expects.
    pub fn instruction(&self, program_id: &Pubkey) -> Instruction {
        let accounts = match self {
            Self::VerifyPhoto {
                creator,
                image_hash,
                ..
            } => {
                let (photo_record, _) = photo_record_address(program_id, creator, image_hash);
                vec![
                    AccountMeta::new(photo_record, false),
                    AccountMeta::new(*creator, true),
                    AccountMeta::new_readonly(system_program::ID, false),
                ]
            }
            Self::Vouch {
                voucher,
                creator,
                photo_record,
                ..
            } => {
                let (vouch_record, _) = vouch_record_address(program_id, voucher, photo_record);
                vec![
                    AccountMeta::new(vouch_record, false),
                    AccountMeta::new(*photo_record, false),
                    AccountMeta::new(*voucher, true),
                    AccountMeta::new(*creator, false),
                    AccountMeta::new_readonly(system_program::ID, false),
                ]
            }
        };

        Instruction {
            program_id: *program_id,
            accounts,
            data: self.data(),
        }
    }

    /// Unsigned transaction built against `block_ref`.
    pub fn transaction(&self, program_id: &Pubkey, block_ref: &BlockRef) -> Transaction {
        let message = Message::new_with_blockhash(
            &[self.instruction(program_id)],
            Some(&self.fee_payer()),
            &block_ref.blockhash,
        );
        Transaction::new_unsigned(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;

    fn block_ref() -> BlockRef {
        BlockRef {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 100,
        }
    }

    #[test]
    fn test_discriminators_match_anchor_convention() {
        assert_eq!(anchor_discriminator("verify_photo"), VERIFY_PHOTO_DISCRIMINATOR);
        assert_eq!(anchor_discriminator("vouch"), VOUCH_DISCRIMINATOR);
    }

    #[test]
    fn test_fixed_point_coordinates() {
        assert_eq!(to_fixed_point(37.775), 377_750_000);
        assert_eq!(to_fixed_point(-122.419), -1_224_190_000);
        assert_eq!(to_fixed_point(0.0), 0);
    }

    #[test]
    fn test_verify_photo_layout() {
        let hash = ImageHash::from_bytes([0xab; 32]);
        let intent = LedgerIntent::VerifyPhoto {
            creator: Pubkey::new_unique(),
            image_hash: hash,
            latitude_e7: 377_750_000,
            longitude_e7: -1_224_190_000,
            timestamp: 1_700_000_000,
        };

        let data = intent.data();
        assert_eq!(data.len(), VERIFY_PHOTO_DATA_LEN);
        assert_eq!(&data[..8], &[0xa6, 0x53, 0x75, 0xc7, 0xc3, 0x30, 0xad, 0x44]);
        assert_eq!(&data[8..40], &[0xab; 32]);
        assert_eq!(&data[40..48], &377_750_000i64.to_le_bytes());
        assert_eq!(&data[48..56], &(-1_224_190_000i64).to_le_bytes());
        assert_eq!(&data[56..64], &1_700_000_000i64.to_le_bytes());
    }

    #[test]
    fn test_vouch_layout() {
        let intent = LedgerIntent::vouch(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            5_000_000,
        );

        let data = intent.data();
        assert_eq!(
            data,
            vec![0x57, 0xf0, 0x08, 0x15, 0xdb, 0xb3, 0xf2, 0xb1, 0x40, 0x4b, 0x4c, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_verify_photo_accounts() {
        let program_id = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let hash = ImageHash::of(b"img");
        let intent = LedgerIntent::VerifyPhoto {
            creator,
            image_hash: hash,
            latitude_e7: 0,
            longitude_e7: 0,
            timestamp: 1,
        };

        let ix = intent.instruction(&program_id);
        assert_eq!(ix.program_id, program_id);
        assert_eq!(ix.accounts.len(), 3);
        assert_eq!(
            ix.accounts[0].pubkey,
            photo_record_address(&program_id, &creator, &hash).0
        );
        assert!(ix.accounts[0].is_writable && !ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[1].pubkey, creator);
        assert!(ix.accounts[1].is_signer && ix.accounts[1].is_writable);
        assert_eq!(ix.accounts[2].pubkey, system_program::ID);
        assert!(!ix.accounts[2].is_writable);
    }

    #[test]
    fn test_vouch_accounts() {
        let program_id = Pubkey::new_unique();
        let voucher = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let photo_record = Pubkey::new_unique();

        let ix = LedgerIntent::vouch(voucher, creator, photo_record, 1).instruction(&program_id);
        let keys: Vec<Pubkey> = ix.accounts.iter().map(|a| a.pubkey).collect();
        assert_eq!(
            keys,
            vec![
                vouch_record_address(&program_id, &voucher, &photo_record).0,
                photo_record,
                voucher,
                creator,
                system_program::ID,
            ]
        );
        assert!(ix.accounts[2].is_signer);
        assert!(!ix.accounts[3].is_signer && ix.accounts[3].is_writable);
    }

    #[test]
    fn test_transaction_uses_block_ref_and_fee_payer() {
        let voucher = Pubkey::new_unique();
        let block_ref = block_ref();
        let intent = LedgerIntent::vouch(voucher, Pubkey::new_unique(), Pubkey::new_unique(), 10);

        let tx = intent.transaction(&Pubkey::new_unique(), &block_ref);
        assert_eq!(tx.message.recent_blockhash, block_ref.blockhash);
        assert_eq!(tx.message.account_keys[0], voucher);
        assert_eq!(tx.message.header.num_required_signatures, 1);
    }
}
