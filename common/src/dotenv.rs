/// Load env vars from `$(pwd)/.env`, the way every `cellbox-*` binary's
/// entry point does before reading its typed config (mirrors the teacher's
/// `arg0::load_dotenv`, minus the CLI-home-directory lookup this server
/// doesn't have).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}
