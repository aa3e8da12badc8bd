//! Advertisement data (AD structure) parsing.

/// AD type: Shortened Local Name.
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
/// AD type: Complete Local Name.
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// Local name carried by an advertisement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalName<'a> {
    pub name: &'a str,
    /// `false` when the advertiser only sent a shortened name.
    pub complete: bool,
}

/// Extract the complete/shortened local name from advertisement data.
///
/// Returns `None` when no name is present, the name is not UTF-8, or the
/// AD structures are malformed before a name is reached.
pub fn extract_local_name(data: &[u8]) -> Option<LocalName<'_>> {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        let ad_type = data[i + 1];
        if ad_type == AD_SHORTENED_LOCAL_NAME || ad_type == AD_COMPLETE_LOCAL_NAME {
            let name_bytes = &data[i + 2..i + 1 + len];
            return core::str::from_utf8(name_bytes).ok().map(|name| LocalName {
                name,
                complete: ad_type == AD_COMPLETE_LOCAL_NAME,
            });
        }
        i += len + 1;
    }
    None
}
