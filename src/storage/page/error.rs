use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Not enough free space on the page")]
    InsufficientSpace,

    #[error("Slot {0} does not exist on the page")]
    SlotOutOfRange(u32),

    #[error("Slot {0} was deleted")]
    SlotDeleted(u32),

    #[error("Record directory is full")]
    DirectoryFull,
}
