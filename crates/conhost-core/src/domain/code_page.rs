//! Code pages the console host accepts, and the language id derived from the
//! output code page.

/// OEM code page used when the platform does not report one (US English).
pub const DEFAULT_OEM_CODE_PAGE: u32 = 437;

pub const CP_UTF8: u32 = 65001;
pub const CP_JAPANESE: u32 = 932;
pub const CP_CHINESE_SIMPLIFIED: u32 = 936;
pub const CP_KOREAN: u32 = 949;
pub const CP_CHINESE_TRADITIONAL: u32 = 950;

const SUPPORTED_CODE_PAGES: &[u32] = &[
    37, 437, 500, 708, 720, 737, 775, 850, 852, 855, 857, 858, 860, 861, 862, 863, 864, 865, 866,
    869, 870, 874, 875, 932, 936, 949, 950, 1026, 1047, 1250, 1251, 1252, 1253, 1254, 1255, 1256,
    1257, 1258, 1361, 10000, 20127, 20866, 21866, 28591, 28592, 28593, 28594, 28595, 28596, 28597,
    28598, 28599, 28603, 28605, 65000, CP_UTF8,
];

/// Returns `true` if `code_page` is one the host can render.
pub fn is_supported_code_page(code_page: u32) -> bool {
    SUPPORTED_CODE_PAGES.contains(&code_page)
}

/// Maps an output code page to a Windows LANGID.
///
/// CJK code pages map to their language; everything else reports US English.
pub fn lang_id_for_code_page(code_page: u32) -> u16 {
    match code_page {
        CP_JAPANESE => 0x0411,
        CP_KOREAN => 0x0412,
        CP_CHINESE_SIMPLIFIED => 0x0804,
        CP_CHINESE_TRADITIONAL => 0x0404,
        _ => 0x0409,
    }
}
