//! RC4 family sealing: every Wrap token is encrypted under a key derived
//! from the token's own sequence number, so out-of-order delivery stays
//! decryptable.

use crate::crypto::MessageCipher;
use crate::Result;

pub(crate) fn seal(
    cipher: &dyn MessageCipher,
    key: &[u8],
    usage: i32,
    seq: u32,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let message_key = cipher.derive_message_key(key, seq)?;

    cipher.seal(&message_key, usage, plaintext)
}

pub(crate) fn unseal(cipher: &dyn MessageCipher, key: &[u8], usage: i32, seq: u32, data: &[u8]) -> Result<Vec<u8>> {
    let message_key = cipher.derive_message_key(key, seq)?;

    cipher.unseal(&message_key, usage, data)
}

#[cfg(test)]
mod tests {
    use crate::crypto::KeyClass;
    use crate::test_data;

    #[test]
    fn wrap_keys_off_the_sequence_number() {
        let mut first = test_data::fake_acceptor_auth(KeyClass::Rc4);
        let mut second = test_data::fake_acceptor_auth(KeyClass::Rc4);
        second.local_seq = first.local_seq + 17;

        let token_a = first.wrap(true, b"same message").unwrap();
        let token_b = second.wrap(true, b"same message").unwrap();

        // bodies differ beyond the sequence block because the seal key does
        let body_a = &token_a[token_a.len() - b"same message".len()..];
        let body_b = &token_b[token_b.len() - b"same message".len()..];
        assert_ne!(body_a, body_b);
    }

    #[test]
    fn out_of_order_tokens_still_unseal() {
        let mut initiator = test_data::fake_initiator_auth(KeyClass::Rc4);
        let mut acceptor = test_data::fake_acceptor_auth(KeyClass::Rc4);

        let first = initiator.wrap(true, b"first").unwrap();
        let second = initiator.wrap(true, b"second").unwrap();

        let (message, sealed) = acceptor.unwrap_token(&second).unwrap();
        assert_eq!(message, b"second");
        assert!(sealed);

        let (message, _) = acceptor.unwrap_token(&first).unwrap();
        assert_eq!(message, b"first");
    }
}
