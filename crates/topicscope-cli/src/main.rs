#![forbid(unsafe_code)]

fn main() {
    std::process::exit(topicscope_cli::run());
}
