const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random `[a-zA-Z0-9]{len}` string drawn from the OS RNG.
///
/// Bytes at or above the largest multiple of the alphabet size are discarded so
/// every character is equally likely.
pub fn random_alnum(len: usize) -> Result<String, getrandom::Error> {
    let limit = (256 / ALPHABET.len() * ALPHABET.len()) as u8;
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        getrandom::getrandom(&mut buf)?;
        for b in buf {
            if b >= limit {
                continue;
            }
            out.push(ALPHABET[b as usize % ALPHABET.len()] as char);
            if out.len() == len {
                break;
            }
        }
    }
    Ok(out)
}
