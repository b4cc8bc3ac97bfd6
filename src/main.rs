fn main() -> anyhow::Result<()> {
    roomba_bridge_lib::run()
}
