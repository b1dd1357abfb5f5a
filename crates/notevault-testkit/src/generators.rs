//! Proptest generators for property-based testing.

use proptest::prelude::*;

use notevault_core::{IdentityId, Record, RecordId};
use notevault_crypto::{content_metadata, encrypt_field, CryptoError, EncryptionKey, Identity};

/// Generate a random RecordId.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 16]>().prop_map(RecordId::from_bytes)
}

/// Generate a random IdentityId.
pub fn identity_id() -> impl Strategy<Value = IdentityId> {
    any::<[u8; 16]>().prop_map(IdentityId::from_bytes)
}

/// Generate an identity with a random key.
pub fn identity() -> impl Strategy<Value = Identity> {
    (any::<[u8; 32]>(), identity_id())
        .prop_map(|(key, id)| Identity::from_parts(EncryptionKey::from_bytes(key), id))
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Generate note text, including multibyte characters.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_len).prop_map(|chars| chars.into_iter().collect())
}

/// Generate a folder name.
pub fn folder() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[A-Za-z][A-Za-z0-9 /-]{0,23}".prop_map(String::from))
}

/// One user action against a single note.
#[derive(Debug, Clone)]
pub enum NoteAction {
    Edit(String),
    Retitle(String),
    Trash,
    Restore,
}

/// Generate a user action.
pub fn note_action() -> impl Strategy<Value = NoteAction> {
    prop_oneof![
        4 => plaintext(200).prop_map(NoteAction::Edit),
        1 => plaintext(40).prop_map(NoteAction::Retitle),
        1 => Just(NoteAction::Trash),
        1 => Just(NoteAction::Restore),
    ]
}

/// Generate a sequence of user actions.
pub fn note_actions(max: usize) -> impl Strategy<Value = Vec<NoteAction>> {
    prop::collection::vec(note_action(), 1..=max)
}

/// Parameters for generating a note record.
#[derive(Debug, Clone)]
pub struct NoteParams {
    pub title: String,
    pub content: String,
    pub folder: Option<String>,
    pub created_at: i64,
}

impl Arbitrary for NoteParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (plaintext(60), plaintext(2_000), folder(), timestamp())
            .prop_map(|(title, content, folder, created_at)| NoteParams {
                title,
                content,
                folder,
                created_at,
            })
            .boxed()
    }
}

/// Build an encrypted record from parameters.
pub fn record_from_params(params: &NoteParams, identity: &Identity) -> Result<Record, CryptoError> {
    let key = identity.key();
    Ok(Record::new(
        identity.id(),
        encrypt_field(params.title.as_bytes(), key)?,
        encrypt_field(params.content.as_bytes(), key)?,
        params
            .folder
            .as_ref()
            .map(|folder| encrypt_field(folder.as_bytes(), key))
            .transpose()?,
        content_metadata(params.content.as_bytes()),
        params.created_at,
    ))
}
