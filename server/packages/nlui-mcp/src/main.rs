fn main() {
    if let Err(err) = nlui_mcp::cli::run_nlui_mcp() {
        tracing::error!(error = %err, "nlui-mcp failed");
        std::process::exit(1);
    }
}
