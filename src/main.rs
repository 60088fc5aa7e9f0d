fn main() -> anyhow::Result<()> {
    mangatrack::cli::run()
}
