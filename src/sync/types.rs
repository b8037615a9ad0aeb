use crate::sync::Listener;
use std::any::{Any, TypeId};
use std::collections::HashMap;

pub(crate) type ListenerList<M> = Vec<Listener<M>>;
// Values are `ListenerList<M>` for the `M` whose `TypeId` is the key
pub(crate) type ChannelMap = HashMap<TypeId, Box<dyn Any + Send>>;
