//! Ordered text decoders for delimited files with no declared encoding.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{
    Encoding, BIG5, EUC_JP, EUC_KR, GB18030, SHIFT_JIS, UTF_8, WINDOWS_1252,
};

/// Which legacy encodings to try between UTF-8 and the Latin fallback.
///
/// The Latin 8-bit decoder accepts every byte sequence, so it always runs
/// last; the locale-specific multi-byte decoders are strict and only win
/// when the bytes are well-formed for them.
///
/// A multi-byte decoder still accepts most Latin-1 text: an accented letter
/// followed by an ASCII byte is a valid GB18030, Big5, EUC-KR or Shift_JIS
/// pair. Under a non-Western profile, a Western legacy file therefore
/// decodes to CJK text without error. Pick the profile that matches where
/// the files were exported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodingProfile {
    #[default]
    Western,
    Japanese,
    SimplifiedChinese,
    TraditionalChinese,
    Korean,
}

impl EncodingProfile {
    pub fn candidates(self) -> Vec<&'static Encoding> {
        let mut out = vec![UTF_8];
        match self {
            EncodingProfile::Western => {}
            // Strict Shift_JIS accepts EUC-JP byte pairs, not the reverse.
            EncodingProfile::Japanese => out.extend([EUC_JP, SHIFT_JIS]),
            EncodingProfile::SimplifiedChinese => out.push(GB18030),
            EncodingProfile::TraditionalChinese => out.push(BIG5),
            EncodingProfile::Korean => out.push(EUC_KR),
        }
        out.push(WINDOWS_1252);
        out
    }
}

impl FromStr for EncodingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "western" | "latin" => Ok(EncodingProfile::Western),
            "japanese" | "ja" => Ok(EncodingProfile::Japanese),
            "simplified-chinese" | "zh-cn" => Ok(EncodingProfile::SimplifiedChinese),
            "traditional-chinese" | "zh-tw" => Ok(EncodingProfile::TraditionalChinese),
            "korean" | "ko" => Ok(EncodingProfile::Korean),
            other => Err(format!(
                "unknown encoding profile '{other}' \
                 (expected western, japanese, simplified-chinese, traditional-chinese or korean)"
            )),
        }
    }
}

impl fmt::Display for EncodingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncodingProfile::Western => "western",
            EncodingProfile::Japanese => "japanese",
            EncodingProfile::SimplifiedChinese => "simplified-chinese",
            EncodingProfile::TraditionalChinese => "traditional-chinese",
            EncodingProfile::Korean => "korean",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Decode attempts
// ---------------------------------------------------------------------------

/// One decoder strategy: an encoding plus the bytes it should see.
#[derive(Debug, Clone, Copy)]
pub struct DecodeAttempt<'a> {
    pub encoding: &'static Encoding,
    payload: &'a [u8],
}

impl<'a> DecodeAttempt<'a> {
    /// Strict decode; `None` on any malformed sequence.
    pub fn decode(&self) -> Option<Cow<'a, str>> {
        self.encoding
            .decode_without_bom_handling_and_without_replacement(self.payload)
    }
}

/// The ordered decoder list for `bytes`.
///
/// A byte-order mark is authoritative: only the encoding it names is tried,
/// with the mark stripped. Otherwise the profile's candidates run in order.
pub fn attempts<'a>(bytes: &'a [u8], profile: EncodingProfile) -> Vec<DecodeAttempt<'a>> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return vec![DecodeAttempt {
            encoding,
            payload: &bytes[bom_len..],
        }];
    }
    profile
        .candidates()
        .into_iter()
        .map(|encoding| DecodeAttempt {
            encoding,
            payload: bytes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_success(bytes: &[u8], profile: EncodingProfile) -> (&'static str, String) {
        attempts(bytes, profile)
            .iter()
            .find_map(|a| a.decode().map(|t| (a.encoding.name(), t.into_owned())))
            .unwrap()
    }

    #[test]
    fn latin_fallback_is_always_last() {
        for profile in [
            EncodingProfile::Western,
            EncodingProfile::Japanese,
            EncodingProfile::SimplifiedChinese,
            EncodingProfile::TraditionalChinese,
            EncodingProfile::Korean,
        ] {
            let list = profile.candidates();
            assert_eq!(list.first(), Some(&UTF_8));
            assert_eq!(list.last(), Some(&WINDOWS_1252));
        }
    }

    #[test]
    fn utf8_wins_when_valid() {
        let (enc, text) = first_success("Gène".as_bytes(), EncodingProfile::Western);
        assert_eq!(enc, "UTF-8");
        assert_eq!(text, "Gène");
    }

    #[test]
    fn latin_bytes_fall_through_to_windows_1252() {
        let (bytes, _, _) = WINDOWS_1252.encode("Gène");
        let (enc, text) = first_success(&bytes, EncodingProfile::Western);
        assert_eq!(enc, "windows-1252");
        assert_eq!(text, "Gène");
    }

    #[test]
    fn shift_jis_is_tried_before_latin_for_japanese() {
        let (bytes, _, _) = SHIFT_JIS.encode("遺伝子");
        let (enc, text) = first_success(&bytes, EncodingProfile::Japanese);
        assert_eq!(enc, "Shift_JIS");
        assert_eq!(text, "遺伝子");
    }

    #[test]
    fn euc_jp_is_not_shadowed_by_shift_jis() {
        let (bytes, _, _) = EUC_JP.encode("遺伝子,ｶﾅ");
        let (enc, text) = first_success(&bytes, EncodingProfile::Japanese);
        assert_eq!(enc, "EUC-JP");
        assert_eq!(text, "遺伝子,ｶﾅ");
    }

    #[test]
    fn latin_bytes_turn_into_cjk_under_a_chinese_profile() {
        let (bytes, _, _) = WINDOWS_1252.encode("Gène,x");
        let (enc, text) = first_success(&bytes, EncodingProfile::SimplifiedChinese);
        assert_eq!(enc, "gb18030");
        assert_ne!(text, "Gène,x");

        let (enc, text) = first_success(&bytes, EncodingProfile::Western);
        assert_eq!(enc, "windows-1252");
        assert_eq!(text, "Gène,x");
    }

    #[test]
    fn bom_is_authoritative_and_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"id\nA1\n");
        let list = attempts(&bytes, EncodingProfile::Japanese);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].decode().unwrap(), "id\nA1\n");
    }

    #[test]
    fn profile_parses_from_flag_text() {
        assert_eq!("Japanese".parse::<EncodingProfile>(), Ok(EncodingProfile::Japanese));
        assert_eq!("zh-tw".parse::<EncodingProfile>(), Ok(EncodingProfile::TraditionalChinese));
        assert!("klingon".parse::<EncodingProfile>().is_err());
    }
}
