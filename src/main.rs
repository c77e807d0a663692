fn main() -> anyhow::Result<()> {
    char_trainer_lib::run()
}
