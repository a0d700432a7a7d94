//! Built-in transformers.
//!
//! Each constructor returns a detached [`Transform`] stage; attach it to a
//! context before calling `transform`.

use std::cmp::Ordering;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::{Transform, Transformer};
use crate::error::Result;
use crate::stream::{Emitter, Flow, Interrupt};

/// A transformer that keeps items matching a predicate
pub struct Filter<F, T> {
    predicate: F,
    _phantom: PhantomData<T>,
}

#[async_trait]
impl<F, T> Transformer for Filter<F, T>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn apply(&mut self, item: T, emitter: &Emitter<T>) -> Flow {
        if (self.predicate)(&item) {
            emitter.emit(item).await?;
        }
        Ok(())
    }
}

/// Keep only the items matching `predicate`
pub fn filter<F, T>(predicate: F) -> Transform<Filter<F, T>>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    Transform::new(Filter {
        predicate,
        _phantom: PhantomData,
    })
}

/// A transformer that drops items matching a predicate
pub struct DropIf<F, T> {
    predicate: F,
    _phantom: PhantomData<T>,
}

#[async_trait]
impl<F, T> Transformer for DropIf<F, T>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn apply(&mut self, item: T, emitter: &Emitter<T>) -> Flow {
        if !(self.predicate)(&item) {
            emitter.emit(item).await?;
        }
        Ok(())
    }
}

/// Drop the items matching `predicate`
pub fn drop_if<F, T>(predicate: F) -> Transform<DropIf<F, T>>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    Transform::new(DropIf {
        predicate,
        _phantom: PhantomData,
    })
}

/// A transformer that replaces each item
pub struct Map<F, T, U> {
    f: F,
    _phantom: PhantomData<(T, U)>,
}

#[async_trait]
impl<F, T, U> Transformer for Map<F, T, U>
where
    F: FnMut(T) -> U + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    type Input = T;
    type Output = U;

    async fn apply(&mut self, item: T, emitter: &Emitter<U>) -> Flow {
        emitter.emit((self.f)(item)).await
    }
}

/// Replace each item with `f(item)`
pub fn map<F, T, U>(f: F) -> Transform<Map<F, T, U>>
where
    F: FnMut(T) -> U + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    Transform::new(Map {
        f,
        _phantom: PhantomData,
    })
}

/// A transformer that replaces each item with a fallible function
pub struct TryMap<F, T, U> {
    f: F,
    _phantom: PhantomData<(T, U)>,
}

#[async_trait]
impl<F, T, U> Transformer for TryMap<F, T, U>
where
    F: FnMut(T) -> Result<U> + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    type Input = T;
    type Output = U;

    async fn apply(&mut self, item: T, emitter: &Emitter<U>) -> Flow {
        let output = (self.f)(item)?;
        emitter.emit(output).await
    }
}

/// Replace each item with `f(item)`; the first error fails the pipeline
pub fn try_map<F, T, U>(f: F) -> Transform<TryMap<F, T, U>>
where
    F: FnMut(T) -> Result<U> + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    Transform::new(TryMap {
        f,
        _phantom: PhantomData,
    })
}

/// A transformer that observes each item and passes it on unchanged
pub struct Each<F, T> {
    f: F,
    _phantom: PhantomData<T>,
}

#[async_trait]
impl<F, T> Transformer for Each<F, T>
where
    F: FnMut(&T) + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn apply(&mut self, item: T, emitter: &Emitter<T>) -> Flow {
        (self.f)(&item);
        emitter.emit(item).await
    }
}

/// Call `f` on each item, passing items through unchanged
pub fn each<F, T>(f: F) -> Transform<Each<F, T>>
where
    F: FnMut(&T) + Send + 'static,
    T: Send + 'static,
{
    Transform::new(Each {
        f,
        _phantom: PhantomData,
    })
}

/// A transformer that passes the first `n` items then stops
pub struct Take<T> {
    remaining: usize,
    _phantom: PhantomData<T>,
}

#[async_trait]
impl<T: Send + 'static> Transformer for Take<T> {
    type Input = T;
    type Output = T;

    async fn apply(&mut self, item: T, emitter: &Emitter<T>) -> Flow {
        if self.remaining == 0 {
            return Err(Interrupt::Done);
        }

        self.remaining -= 1;
        emitter.emit(item).await?;

        if self.remaining == 0 {
            Err(Interrupt::Done)
        } else {
            Ok(())
        }
    }
}

/// Pass the first `count` items, then end the stage
pub fn take<T: Send + 'static>(count: usize) -> Transform<Take<T>> {
    Transform::new(Take {
        remaining: count,
        _phantom: PhantomData,
    })
}

/// A transformer that passes items while a predicate holds
pub struct TakeWhile<F, T> {
    predicate: F,
    _phantom: PhantomData<T>,
}

#[async_trait]
impl<F, T> Transformer for TakeWhile<F, T>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn apply(&mut self, item: T, emitter: &Emitter<T>) -> Flow {
        if !(self.predicate)(&item) {
            return Err(Interrupt::Done);
        }
        emitter.emit(item).await
    }
}

/// Pass items while `predicate` holds, then end the stage
pub fn take_while<F, T>(predicate: F) -> Transform<TakeWhile<F, T>>
where
    F: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    Transform::new(TakeWhile {
        predicate,
        _phantom: PhantomData,
    })
}

/// A transformer that unrolls collection-valued items
pub struct Flatten<I> {
    _phantom: PhantomData<I>,
}

#[async_trait]
impl<I> Transformer for Flatten<I>
where
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
    I::IntoIter: Send,
{
    type Input = I;
    type Output = I::Item;

    async fn apply(&mut self, items: I, emitter: &Emitter<I::Item>) -> Flow {
        for item in items {
            emitter.emit(item).await?;
        }
        Ok(())
    }
}

/// Emit every element of each collection item
pub fn flatten<I>() -> Transform<Flatten<I>>
where
    I: IntoIterator + Send + 'static,
    I::Item: Send + 'static,
    I::IntoIter: Send,
{
    Transform::new(Flatten {
        _phantom: PhantomData,
    })
}

/// A transformer that folds every item into one value
pub struct Reduce<F, T, A> {
    acc: Option<A>,
    f: F,
    _phantom: PhantomData<T>,
}

#[async_trait]
impl<F, T, A> Transformer for Reduce<F, T, A>
where
    F: FnMut(A, T) -> A + Send + 'static,
    T: Send + 'static,
    A: Send + 'static,
{
    type Input = T;
    type Output = A;

    async fn apply(&mut self, item: T, _emitter: &Emitter<A>) -> Flow {
        if let Some(acc) = self.acc.take() {
            self.acc = Some((self.f)(acc, item));
        }
        Ok(())
    }

    async fn finish(&mut self, emitter: &Emitter<A>) -> Flow {
        match self.acc.take() {
            Some(acc) => emitter.emit(acc).await,
            None => Ok(()),
        }
    }
}

/// Fold the input with `f` starting from `init`, emitting the result once
/// the input ends
pub fn reduce<F, T, A>(init: A, f: F) -> Transform<Reduce<F, T, A>>
where
    F: FnMut(A, T) -> A + Send + 'static,
    T: Send + 'static,
    A: Send + 'static,
{
    Transform::new(Reduce {
        acc: Some(init),
        f,
        _phantom: PhantomData,
    })
}

/// A transformer that buffers everything and emits it sorted
pub struct SortBy<F, T> {
    items: Vec<T>,
    compare: F,
}

#[async_trait]
impl<F, T> Transformer for SortBy<F, T>
where
    F: FnMut(&T, &T) -> Ordering + Send + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn apply(&mut self, item: T, _emitter: &Emitter<T>) -> Flow {
        self.items.push(item);
        Ok(())
    }

    async fn finish(&mut self, emitter: &Emitter<T>) -> Flow {
        let mut items = std::mem::take(&mut self.items);
        items.sort_by(&mut self.compare);
        for item in items {
            emitter.emit(item).await?;
        }
        Ok(())
    }
}

/// Emit the whole input sorted by `compare` once it ends
pub fn sort_by<F, T>(compare: F) -> Transform<SortBy<F, T>>
where
    F: FnMut(&T, &T) -> Ordering + Send + 'static,
    T: Send + 'static,
{
    Transform::new(SortBy {
        items: Vec::new(),
        compare,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Error;
    use crate::stream::filled;

    fn evens(x: &i32) -> bool {
        x % 2 == 0
    }

    #[tokio::test]
    async fn test_filter() {
        let ctx = Context::new();
        let input = filled(vec![1, 2]).await;

        let output = filter(evens).attach(&ctx).transform(input).unwrap();

        assert_eq!(output.read_all().await, vec![2]);
    }

    #[tokio::test]
    async fn test_filter_on_closed_context_emits_nothing() {
        let ctx = Context::new();
        let input = filled(vec![1, 2]).await;
        ctx.close();

        let output = filter(evens).attach(&ctx).transform(input).unwrap();

        assert!(output.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_on_failed_context_emits_nothing() {
        let ctx = Context::new();
        let input = filled(vec![2, 4]).await;
        ctx.fail("earlier stage failed");

        let output = filter(evens).attach(&ctx).transform(input).unwrap();

        assert!(output.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_if() {
        let ctx = Context::new();
        let input = filled(vec![1, 2, 3, 4]).await;

        let output = drop_if(evens).attach(&ctx).transform(input).unwrap();

        assert_eq!(output.read_all().await, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_map() {
        let ctx = Context::new();
        let input = filled(vec!["a", "b"]).await;

        let output = map(|s: &str| format!("{s}_"))
            .attach(&ctx)
            .transform(input)
            .unwrap();

        assert_eq!(output.read_all().await, vec!["a_", "b_"]);
    }

    #[tokio::test]
    async fn test_try_map_fails_pipeline() {
        let ctx = Context::new();
        let input = filled(vec!["1", "x", "3"]).await;

        let output = try_map(|s: &str| s.parse::<i32>().map_err(Error::stage))
            .attach(&ctx)
            .transform(input)
            .unwrap();

        assert_eq!(output.read_all().await, vec![1]);
        assert!(ctx.is_failed());
        assert!(matches!(ctx.shutdown().await, Err(Error::Stage(_))));
    }

    #[tokio::test]
    async fn test_each_passes_items_through() {
        let ctx = Context::new();
        let input = filled(vec![1, 2, 3]).await;
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let output = each(move |x: &i32| sink.lock().push(*x))
            .attach(&ctx)
            .transform(input)
            .unwrap();

        assert_eq!(output.read_all().await, vec![1, 2, 3]);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_take_ends_stage_early() {
        let ctx = Context::new();
        let input = filled(vec![1, 2, 3, 4]).await;

        let output = take(2).attach(&ctx).transform(input).unwrap();

        assert_eq!(output.read_all().await, vec![1, 2]);
        assert!(ctx.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_take_while() {
        let ctx = Context::new();
        let input = filled(vec![2, 4, 5, 6]).await;

        let output = take_while(evens).attach(&ctx).transform(input).unwrap();

        assert_eq!(output.read_all().await, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_flatten() {
        let ctx = Context::new();
        let input = filled(vec![vec!["a", "c"], vec!["b"], vec![], vec!["d", "e"]]).await;

        let output = flatten().attach(&ctx).transform(input).unwrap();

        assert_eq!(output.read_all().await, vec!["a", "c", "b", "d", "e"]);
    }

    #[tokio::test]
    async fn test_reduce_emits_once_at_end() {
        let ctx = Context::new();
        let input = filled(vec![3, 5]).await;

        let output = reduce(0, |acc, x: i32| acc + x)
            .attach(&ctx)
            .transform(input)
            .unwrap();

        assert_eq!(output.read_all().await, vec![8]);
    }

    #[tokio::test]
    async fn test_reduce_empty_input_emits_init() {
        let ctx = Context::new();
        let input = filled(Vec::<i32>::new()).await;

        let output = reduce(7, |acc, x: i32| acc + x)
            .attach(&ctx)
            .transform(input)
            .unwrap();

        assert_eq!(output.read_all().await, vec![7]);
    }

    #[tokio::test]
    async fn test_sort_by() {
        let ctx = Context::new();
        let input = filled(vec!["c_", "a_", "b_"]).await;

        let output = sort_by(|a: &&str, b: &&str| a.cmp(b))
            .attach(&ctx)
            .transform(input)
            .unwrap();

        assert_eq!(output.read_all().await, vec!["a_", "b_", "c_"]);
    }
}
