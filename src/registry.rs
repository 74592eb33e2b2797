/// 显式注入的注册表接口
///
/// 工具目录、Agent 注册表与阶段映射都实现该接口，测试可以各自构造隔离的实例。
pub trait Registry {
    type Key: ?Sized;
    type Entry;

    fn register(&mut self, entry: Self::Entry);
    fn get(&self, key: &Self::Key) -> Option<&Self::Entry>;
    fn all(&self) -> Vec<&Self::Entry>;
}
