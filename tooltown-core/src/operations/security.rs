//! Standard security handler, RC4 variants (V1/V2, R2/R3).
//!
//! Encryption always writes V2/R3 with a 128-bit key. Decryption accepts
//! either the user or the owner password.

use super::{load_pdf, resolve_dict, save_pdf, strip_structural_streams, OperationResult};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};

/// Password padding string
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const KEY_LEN: usize = 16;
const REVISION: i64 = 3;
/// Every permission granted
const PERMISSIONS: i32 = -4;

struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, byte) in s.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, usize::from(j));
        }
        Self { s, i: 0, j: 0 }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[usize::from(self.i)]);
            self.s.swap(usize::from(self.i), usize::from(self.j));
            let k = self.s[usize::from(
                self.s[usize::from(self.i)].wrapping_add(self.s[usize::from(self.j)]),
            )];
            *byte ^= k;
        }
    }
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    Rc4::new(key).apply(&mut out);
    out
}

fn digest(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

fn xor_key(key: &[u8], round: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ round).collect()
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Parameters of a standard security handler dictionary.
#[derive(Debug, Clone)]
struct SecurityParams {
    revision: i64,
    key_len: usize,
    owner_entry: Vec<u8>,
    user_entry: Vec<u8>,
    permissions: i32,
    file_id: Vec<u8>,
}

/// Algorithm 2: file key from a padded user password.
fn file_key(padded_user: &[u8; 32], params: &SecurityParams) -> Vec<u8> {
    let mut data = Vec::with_capacity(32 + params.owner_entry.len() + 4 + params.file_id.len());
    data.extend_from_slice(padded_user);
    data.extend_from_slice(&params.owner_entry);
    data.extend_from_slice(&params.permissions.to_le_bytes());
    data.extend_from_slice(&params.file_id);

    let mut hash = digest(&data);
    if params.revision >= 3 {
        for _ in 0..50 {
            hash = digest(&hash[..params.key_len]);
        }
    }
    hash[..params.key_len].to_vec()
}

/// Key used to encrypt the /O entry (first steps of algorithm 3).
fn owner_rc4_key(owner_password: &[u8], revision: i64, key_len: usize) -> Vec<u8> {
    let mut hash = digest(&pad_password(owner_password));
    if revision >= 3 {
        for _ in 0..50 {
            hash = digest(&hash);
        }
    }
    hash[..key_len].to_vec()
}

/// Algorithm 3: the /O entry.
fn owner_entry(
    owner_password: &[u8],
    user_password: &[u8],
    revision: i64,
    key_len: usize,
) -> Vec<u8> {
    let key = owner_rc4_key(owner_password, revision, key_len);
    let mut result = rc4(&key, &pad_password(user_password));
    if revision >= 3 {
        for round in 1..=19 {
            result = rc4(&xor_key(&key, round), &result);
        }
    }
    result
}

/// Algorithms 4 and 5: the /U entry for a file key.
fn user_entry(key: &[u8], params: &SecurityParams) -> Vec<u8> {
    if params.revision < 3 {
        return rc4(key, &PADDING);
    }
    let mut data = PADDING.to_vec();
    data.extend_from_slice(&params.file_id);
    let mut result = rc4(key, &digest(&data));
    for round in 1..=19 {
        result = rc4(&xor_key(key, round), &result);
    }
    result.resize(32, 0);
    result
}

/// Algorithm 6: returns the file key if `password` is the user password.
fn authenticate_user(password: &[u8], params: &SecurityParams) -> Option<Vec<u8>> {
    authenticate_padded_user(&pad_password(password), params)
}

fn authenticate_padded_user(padded: &[u8; 32], params: &SecurityParams) -> Option<Vec<u8>> {
    let key = file_key(padded, params);
    let expected = user_entry(&key, params);
    // R3 only defines the first 16 bytes of /U
    let compared = if params.revision >= 3 { 16 } else { 32 };
    let matches = params.user_entry.len() >= compared
        && expected.len() >= compared
        && params.user_entry[..compared] == expected[..compared];
    matches.then_some(key)
}

/// Algorithm 7: recovers the user password from /O and authenticates with it.
fn authenticate_owner(password: &[u8], params: &SecurityParams) -> Option<Vec<u8>> {
    let key = owner_rc4_key(password, params.revision, params.key_len);
    let mut user = params.owner_entry.clone();
    if params.revision >= 3 {
        for round in (0..=19).rev() {
            user = rc4(&xor_key(&key, round), &user);
        }
    } else {
        user = rc4(&key, &user);
    }
    let padded: [u8; 32] = user.get(..32)?.try_into().ok()?;
    authenticate_padded_user(&padded, params)
}

/// Algorithm 1: per-object RC4 key.
fn object_key(file_key: &[u8], (number, generation): ObjectId) -> Vec<u8> {
    let mut data = file_key.to_vec();
    data.extend_from_slice(&number.to_le_bytes()[..3]);
    data.extend_from_slice(&generation.to_le_bytes()[..2]);
    let hash = digest(&data);
    hash[..(file_key.len() + 5).min(16)].to_vec()
}

/// RC4 is symmetric, so this both encrypts and decrypts.
fn crypt_object(object: &mut Object, key: &[u8]) {
    match object {
        Object::String(bytes, _) => *bytes = rc4(key, bytes),
        Object::Array(items) => items.iter_mut().for_each(|item| crypt_object(item, key)),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, value)| crypt_object(value, key)),
        Object::Stream(stream) => {
            stream
                .dict
                .iter_mut()
                .for_each(|(_, value)| crypt_object(value, key));
            let content = rc4(key, &stream.content);
            stream.set_content(content);
        }
        _ => {}
    }
}

fn crypt_document(doc: &mut Document, file_key: &[u8]) {
    for (&id, object) in doc.objects.iter_mut() {
        crypt_object(object, &object_key(file_key, id));
    }
}

fn first_file_id(doc: &Document) -> Option<Vec<u8>> {
    doc.trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()?
        .first()?
        .as_str()
        .ok()
        .map(<[u8]>::to_vec)
}

pub(super) fn encrypt(
    input: &ValidatedFile,
    user_password: &str,
    owner_password: Option<&str>,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "encrypt";

    let mut doc = load_pdf(input, OP)?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(ToolError::Validation("PDF is already encrypted".into()));
    }
    strip_structural_streams(&mut doc);

    let file_id = match first_file_id(&doc) {
        Some(id) => id,
        None => {
            let id = rand::random::<[u8; 16]>().to_vec();
            let entry = Object::String(id.clone(), StringFormat::Hexadecimal);
            doc.trailer.set("ID", vec![entry.clone(), entry]);
            id
        }
    };

    let owner_password = owner_password.unwrap_or(user_password);
    let mut params = SecurityParams {
        revision: REVISION,
        key_len: KEY_LEN,
        owner_entry: owner_entry(
            owner_password.as_bytes(),
            user_password.as_bytes(),
            REVISION,
            KEY_LEN,
        ),
        user_entry: Vec::new(),
        permissions: PERMISSIONS,
        file_id,
    };
    let key = file_key(&pad_password(user_password.as_bytes()), &params);
    params.user_entry = user_entry(&key, &params);

    crypt_document(&mut doc, &key);

    // Added after encryption: the security dictionary itself stays in the clear.
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 2,
        "R" => REVISION,
        "Length" => (KEY_LEN * 8) as i64,
        "O" => Object::String(params.owner_entry, StringFormat::Hexadecimal),
        "U" => Object::String(params.user_entry, StringFormat::Hexadecimal),
        "P" => i64::from(PERMISSIONS),
    });
    doc.trailer.set("Encrypt", encrypt_id);

    let artifact = save_pdf(&mut doc, "encrypted", OP, stager)?;
    tracing::info!(revision = REVISION, key_bits = KEY_LEN * 8, "encrypted PDF");
    Ok(OperationResult::Artifact(artifact))
}

pub(super) fn decrypt(
    input: &ValidatedFile,
    password: &str,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "decrypt";

    let mut doc = load_pdf(input, OP)?;
    let (encrypt_ref, encrypt) = {
        let Ok(entry) = doc.trailer.get(b"Encrypt") else {
            return Err(ToolError::Auth);
        };
        let dict = resolve_dict(&doc, entry).cloned().ok_or(ToolError::Auth)?;
        (entry.as_reference().ok(), dict)
    };

    let filter = encrypt.get(b"Filter").and_then(Object::as_name).unwrap_or_default();
    let version = encrypt.get(b"V").and_then(Object::as_i64).unwrap_or(0);
    let revision = encrypt.get(b"R").and_then(Object::as_i64).unwrap_or(0);
    if filter != b"Standard" || !(1..=2).contains(&version) || !(2..=3).contains(&revision) {
        return Err(ToolError::InvalidFormat(format!(
            "Unsupported encryption (V{version}, R{revision}); \
             only RC4 standard security is supported"
        )));
    }

    let key_len = if revision == 2 {
        5
    } else {
        let bits = encrypt.get(b"Length").and_then(Object::as_i64).unwrap_or(40);
        (bits / 8).clamp(5, 16) as usize
    };
    let entry = |name: &[u8]| {
        encrypt
            .get(name)
            .and_then(Object::as_str)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    };
    let params = SecurityParams {
        revision,
        key_len,
        owner_entry: entry(b"O"),
        user_entry: entry(b"U"),
        // /P may be written as an unsigned 32-bit value; keep the low bits.
        permissions: encrypt.get(b"P").and_then(Object::as_i64).unwrap_or(0) as i32,
        file_id: first_file_id(&doc).unwrap_or_default(),
    };

    let key = authenticate_user(password.as_bytes(), &params)
        .or_else(|| authenticate_owner(password.as_bytes(), &params))
        .ok_or(ToolError::Auth)?;

    if let Some(id) = encrypt_ref {
        doc.objects.remove(&id);
    }
    doc.trailer.remove(b"Encrypt");
    strip_structural_streams(&mut doc);
    crypt_document(&mut doc, &key);

    let artifact = save_pdf(&mut doc, "decrypted", OP, stager)?;
    tracing::info!(revision, key_bits = key_len * 8, "decrypted PDF");
    Ok(OperationResult::Artifact(artifact))
}
