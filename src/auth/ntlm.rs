//! NTLMv2 messages for the transport's NTLM attempt.
//!
//! The exchange runs Type 1 (negotiate), then the server's Type 2 (challenge, carried in
//! `WWW-Authenticate: NTLM <base64>`), then Type 3 (authenticate). Only NTLMv2 responses are
//! produced. A `DOMAIN\user` (or `DOMAIN/user`) username supplies the domain.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use rand::Rng;
// self
use crate::{_prelude::*, auth::Credentials};

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSION_SECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_FLAGS: u32 = NEGOTIATE_UNICODE
	| NEGOTIATE_OEM
	| REQUEST_TARGET
	| NEGOTIATE_NTLM
	| NEGOTIATE_ALWAYS_SIGN
	| NEGOTIATE_EXTENDED_SESSION_SECURITY;
const AV_EOL: u16 = 0;
const AV_TIMESTAMP: u16 = 7;
const AUTHENTICATE_HEADER_LEN: usize = 64;
// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_OFFSET: i128 = 11_644_473_600;

/// Server challenge decoded from a Type 2 message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NtlmChallenge {
	/// Eight-byte server nonce.
	pub server_challenge: [u8; 8],
	/// Negotiate flags chosen by the server.
	pub flags: u32,
	/// Raw AV pair list, empty when the server sent none.
	pub target_info: Vec<u8>,
}
impl NtlmChallenge {
	/// Extracts the challenge from a (possibly comma-joined) `WWW-Authenticate` value.
	pub fn from_header(value: &str) -> Option<Self> {
		value
			.split(',')
			.map(str::trim)
			.find_map(|part| {
				part.get(..5).filter(|scheme| scheme.eq_ignore_ascii_case("NTLM ")).map(|_| &part[5..])
			})
			.and_then(|token| STANDARD.decode(token.trim()).ok())
			.and_then(|message| Self::from_message(&message))
	}

	/// Decodes a raw Type 2 message; anything malformed yields `None`.
	pub fn from_message(message: &[u8]) -> Option<Self> {
		if message.get(..8)? != SIGNATURE || read_u32(message, 8)? != 2 {
			return None;
		}

		let flags = read_u32(message, 20)?;
		let server_challenge = message.get(24..32)?.try_into().ok()?;
		let target_info = if flags & NEGOTIATE_TARGET_INFO == 0 {
			Vec::new()
		} else {
			security_buffer(message, 40)?.to_vec()
		};

		Some(Self { server_challenge, flags, target_info })
	}

	fn timestamp(&self) -> Option<[u8; 8]> {
		let mut rest = self.target_info.as_slice();

		while rest.len() >= 4 {
			let id = u16::from_le_bytes([rest[0], rest[1]]);
			let len = usize::from(u16::from_le_bytes([rest[2], rest[3]]));
			let value = rest.get(4..4 + len)?;

			match id {
				AV_EOL => break,
				AV_TIMESTAMP => return value.try_into().ok(),
				_ => rest = &rest[4 + len..],
			}
		}

		None
	}
}

/// `Authorization` value carrying a Type 1 (negotiate) message.
///
/// Advertises Unicode, OEM, NTLM, always-sign, and extended session security, with empty domain
/// and workstation buffers.
pub fn negotiate_header() -> String {
	let mut message = Vec::with_capacity(32);

	message.extend_from_slice(SIGNATURE);
	message.extend_from_slice(&1_u32.to_le_bytes());
	message.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());
	// Domain and workstation security buffers: length, max length, offset.
	message.extend_from_slice(&[0; 16]);

	format!("NTLM {}", STANDARD.encode(message))
}

/// `Authorization` value answering `challenge` with a Type 3 message.
///
/// Uses the server's timestamp when the challenge carries one, otherwise `now`.
pub fn authenticate_header(
	challenge: &NtlmChallenge,
	credentials: &Credentials,
	now: OffsetDateTime,
) -> String {
	let mut client_challenge = [0_u8; 8];

	rand::rng().fill(&mut client_challenge);

	let timestamp = challenge.timestamp().unwrap_or_else(|| filetime(now));
	let message = authenticate_message(challenge, credentials, client_challenge, timestamp);

	format!("NTLM {}", STANDARD.encode(message))
}

/// Builds the raw Type 3 message for fixed client inputs.
pub fn authenticate_message(
	challenge: &NtlmChallenge,
	credentials: &Credentials,
	client_challenge: [u8; 8],
	timestamp: [u8; 8],
) -> Vec<u8> {
	let (domain, user) = split_domain(&credentials.username);
	let key = ntowf_v2(credentials.password.expose(), user, domain);
	let blob = client_blob(timestamp, client_challenge, &challenge.target_info);
	let proof = hmac_md5(&key, &[challenge.server_challenge.as_slice(), blob.as_slice()]);
	let nt_response = [proof.as_slice(), blob.as_slice()].concat();
	// LMv2 is zeroed when the server supplied its own timestamp.
	let lm_response = if challenge.timestamp().is_some() {
		vec![0; 24]
	} else {
		[
			hmac_md5(&key, &[challenge.server_challenge.as_slice(), client_challenge.as_slice()])
				.as_slice(),
			client_challenge.as_slice(),
		]
		.concat()
	};
	let domain = utf16le(domain);
	let user = utf16le(user);
	let flags = (challenge.flags & (NEGOTIATE_FLAGS | NEGOTIATE_TARGET_INFO))
		| NEGOTIATE_UNICODE
		| NEGOTIATE_NTLM;
	// LM, NT, domain, user, workstation, session key.
	let fields: [&[u8]; 6] = [&lm_response, &nt_response, &domain, &user, &[], &[]];
	let mut message = Vec::with_capacity(
		AUTHENTICATE_HEADER_LEN + fields.iter().map(|field| field.len()).sum::<usize>(),
	);
	let mut offset = AUTHENTICATE_HEADER_LEN;

	message.extend_from_slice(SIGNATURE);
	message.extend_from_slice(&3_u32.to_le_bytes());

	for field in fields {
		let len = field.len() as u16;

		message.extend_from_slice(&len.to_le_bytes());
		message.extend_from_slice(&len.to_le_bytes());
		message.extend_from_slice(&(offset as u32).to_le_bytes());

		offset += field.len();
	}

	message.extend_from_slice(&flags.to_le_bytes());

	for field in fields {
		message.extend_from_slice(field);
	}

	message
}

/// NT one-way function v2: `HMAC-MD5(MD4(password), UPPER(user) ++ domain)` over UTF-16LE.
pub fn ntowf_v2(password: &str, user: &str, domain: &str) -> [u8; 16] {
	let nt_hash = Md4::digest(utf16le(password));
	let identity = [utf16le(&user.to_uppercase()), utf16le(domain)].concat();

	hmac_md5(&nt_hash, &[identity.as_slice()])
}

fn client_blob(timestamp: [u8; 8], client_challenge: [u8; 8], target_info: &[u8]) -> Vec<u8> {
	let mut blob = Vec::with_capacity(32 + target_info.len());

	// Response versions, then six reserved bytes.
	blob.extend_from_slice(&[1, 1, 0, 0, 0, 0, 0, 0]);
	blob.extend_from_slice(&timestamp);
	blob.extend_from_slice(&client_challenge);
	blob.extend_from_slice(&[0; 4]);
	blob.extend_from_slice(target_info);
	blob.extend_from_slice(&[0; 4]);

	blob
}

fn split_domain(username: &str) -> (&str, &str) {
	username.split_once(['\\', '/']).unwrap_or(("", username))
}

fn filetime(now: OffsetDateTime) -> [u8; 8] {
	let ticks = now.unix_timestamp_nanos() / 100 + FILETIME_UNIX_OFFSET * 10_000_000;

	(ticks as u64).to_le_bytes()
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
	let mut mac = match HmacMd5::new_from_slice(key) {
		Ok(mac) => mac,
		Err(_) => unreachable!("HMAC-MD5 accepts keys of any length"),
	};

	for part in parts {
		mac.update(part);
	}

	mac.finalize().into_bytes().into()
}

fn utf16le(value: &str) -> Vec<u8> {
	value.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn read_u16(message: &[u8], at: usize) -> Option<u16> {
	message.get(at..at + 2)?.try_into().ok().map(u16::from_le_bytes)
}

fn read_u32(message: &[u8], at: usize) -> Option<u32> {
	message.get(at..at + 4)?.try_into().ok().map(u32::from_le_bytes)
}

fn security_buffer(message: &[u8], at: usize) -> Option<&[u8]> {
	let len = usize::from(read_u16(message, at)?);
	let offset = read_u32(message, at + 4)? as usize;

	message.get(offset..offset + len)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	// Server challenge from the MS-NLMP NTLMv2 worked example: target name `Domain`, AV pairs
	// `Domain` and `Server`, challenge 0123456789abcdef.
	const CHALLENGE: &str = "TlRMTVNTUAACAAAADAAMADAAAAABAogAASNFZ4mrze8AAAAAAAAAACQAJAA8AAAARABvAG0AYQBpAG4AAgAMAEQAbwBtAGEAaQBuAAEADABTAGUAcgB2AGUAcgAAAAAA";

	fn hex16(bytes: &[u8]) -> String {
		hex::encode(&bytes[..16])
	}

	fn challenge() -> NtlmChallenge {
		NtlmChallenge::from_header(&format!("Basic realm=\"kurl\", NTLM {CHALLENGE}"))
			.expect("Challenge should decode.")
	}

	#[test]
	fn negotiate_message_layout() {
		let header = negotiate_header();
		let encoded = header.strip_prefix("NTLM ").expect("Header should carry the NTLM scheme.");
		let message = STANDARD.decode(encoded).expect("Message should be valid base64.");

		assert!(header.starts_with("NTLM TlRMTVNTUAABAAAA"));
		assert_eq!(message.len(), 32);
		assert_eq!(message[12..16], NEGOTIATE_FLAGS.to_le_bytes());
		assert!(message[16..].iter().all(|byte| *byte == 0));
	}

	#[test]
	fn challenge_is_found_among_other_schemes() {
		let challenge = challenge();

		assert_eq!(challenge.server_challenge, [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
		assert_eq!(challenge.flags, 0x0088_0201);
		assert_eq!(challenge.target_info.len(), 36);
		assert_eq!(challenge.timestamp(), None);
	}

	#[test]
	fn malformed_challenges_are_ignored() {
		assert_eq!(NtlmChallenge::from_header("Basic realm=\"kurl\""), None);
		assert_eq!(NtlmChallenge::from_header("NTLM not-base64!"), None);
		// A Type 1 message is not a challenge.
		assert_eq!(NtlmChallenge::from_header(&negotiate_header()), None);
		assert_eq!(NtlmChallenge::from_message(b"NTLMSSP\0\x02\0\0\0"), None);
	}

	#[test]
	fn ntowf_v2_matches_reference_vector() {
		assert_eq!(
			hex::encode(ntowf_v2("Password", "User", "Domain")),
			"0c868a403bfd7a93a3001ef22ef02e3f"
		);
	}

	#[test]
	fn authenticate_message_matches_reference_vector() {
		let credentials = Credentials::new("Domain\\User", "Password");
		let message = authenticate_message(&challenge(), &credentials, [0xAA; 8], [0; 8]);
		let field = |at: usize| security_buffer(&message, at).expect("Field should be in bounds.");

		assert_eq!(&message[..8], SIGNATURE);
		assert_eq!(read_u32(&message, 8), Some(3));
		// LMv2 response.
		assert_eq!(hex16(field(12)), "86c35097ac9cec102554764a57cccc19");
		assert_eq!(&field(12)[16..], &[0xAA_u8; 8]);
		// NTProofStr followed by the client blob.
		assert_eq!(field(20).len(), 84);
		assert_eq!(hex16(field(20)), "68cd0ab851e51c96aabc927bebef6a1c");
		assert_eq!(field(28), utf16le("Domain").as_slice());
		assert_eq!(field(36), utf16le("User").as_slice());
		assert!(field(44).is_empty());
	}

	#[test]
	fn server_timestamp_zeroes_the_lm_response() {
		let mut challenge = challenge();
		let stamp = [7, 0, 8, 0, 1, 2, 3, 4, 5, 6, 7, 8];

		challenge.target_info.splice(0..0, stamp);

		let message =
			authenticate_message(&challenge, &Credentials::new("user", "pw"), [0xAA; 8], [0; 8]);
		let nt_response = security_buffer(&message, 20).expect("NT response should be in bounds.");

		assert_eq!(challenge.timestamp(), Some([1, 2, 3, 4, 5, 6, 7, 8]));
		assert_eq!(security_buffer(&message, 12), Some([0_u8; 24].as_slice()));
		// Blob timestamp follows the NTProofStr and the eight version bytes.
		assert_eq!(nt_response[24..32], [1_u8, 2, 3, 4, 5, 6, 7, 8]);
	}

	#[test]
	fn authenticate_header_is_a_type3_message() {
		let header = authenticate_header(
			&challenge(),
			&Credentials::new("john", "go"),
			time::macros::datetime!(2025-11-10 12:00 UTC),
		);

		assert!(header.starts_with("NTLM TlRMTVNTUAADAAAA"));
	}

	#[test]
	fn filetime_counts_from_1601() {
		let epoch = OffsetDateTime::UNIX_EPOCH;

		assert_eq!(u64::from_le_bytes(filetime(epoch)), 116_444_736_000_000_000);
	}
}
