use teleproto_crypto::rsa::{self, Key, PrivateKey};
use teleproto_crypto::{dev, sha1};

const PRODUCTION_N: &str = "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323";

#[test]
fn production_fingerprint() {
    let key = Key::new(PRODUCTION_N, "65537").unwrap();
    assert_eq!(key.fingerprint(), -3414540481677951611);
}

#[test]
fn private_key_reverses_encryption() {
    let private: PrivateKey = dev::private_key();
    let data = b"p_q_inner_data goes here".to_vec();
    let random = [0x42u8; rsa::RANDOM_LEN];

    let ciphertext = rsa::encrypt_hashed(&data, private.public_key(), &random).unwrap();
    assert_eq!(ciphertext.len(), 256);

    let block = private.decrypt(&ciphertext).unwrap();
    assert_eq!(block.len(), rsa::PADDED_LEN);
    assert_eq!(&block[..20], &sha1!(&data));
    assert_eq!(&block[20..20 + data.len()], &data[..]);
    assert!(block[20 + data.len()..].iter().all(|&b| b == 0x42));
}

#[test]
fn ciphertext_size_is_checked() {
    let private = dev::private_key();
    assert_eq!(private.decrypt(&[1; 255]), Err(rsa::RsaError::InvalidLength { len: 255 }));
    assert_eq!(private.decrypt(&[0xff; 256]), Err(rsa::RsaError::OutOfRange));
}
